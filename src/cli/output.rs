use std::io::IsTerminal;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Debug, Clone)]
pub struct OutputOptions {
    pub format: OutputFormat,
    pub pretty: bool,
    pub use_color: bool,
    pub verbose: bool,
}

/// Resolve coloring from `--no-color`, `NO_COLOR` and the config `color` setting.
pub fn detect_color(color_flag: bool, setting: &str) -> bool {
    if !color_flag || std::env::var_os("NO_COLOR").is_some() {
        return false;
    }
    match setting {
        "always" => true,
        "never" => false,
        _ => std::io::stdout().is_terminal(),
    }
}

/// Print a serializable value as JSON on stdout.
pub fn print_json<T: serde::Serialize>(value: &T, opts: &OutputOptions) -> anyhow::Result<()> {
    let json = if opts.pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{}", json);
    Ok(())
}
