//! Build script for scp-runtime
//!
//! Handles configuration merging:
//! 1. Start with library defaults
//! 2. If SCP_CONFIG_RS env var is set, parse the board's config file
//! 3. Merge board values over defaults (board wins)
//! 4. Generate OUT_DIR/scp_merged_config.rs
//!
//! A board file only lists the values it changes.

use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::Path;

struct ConfigParam {
    name: &'static str,
    rust_type: &'static str,
    default_value: &'static str,
}

const CONFIG_PARAMS: &[ConfigParam] = &[
    ConfigParam {
        name: "EVENT_COUNT",
        rust_type: "usize",
        default_value: "64",
    },
    ConfigParam {
        name: "SIGNAL_COUNT",
        rust_type: "usize",
        default_value: "8",
    },
    ConfigParam {
        name: "THREAD_COUNT",
        rust_type: "usize",
        default_value: "4",
    },
    ConfigParam {
        name: "LOG_BUFFERED",
        rust_type: "bool",
        default_value: "false",
    },
    ConfigParam {
        name: "TRACE_EVENTS",
        rust_type: "bool",
        default_value: "false",
    },
];

fn main() {
    let out_dir = env::var("OUT_DIR").expect("OUT_DIR not set");
    let dest_path = Path::new(&out_dir).join("scp_merged_config.rs");

    let mut config: HashMap<&str, String> = CONFIG_PARAMS
        .iter()
        .map(|p| (p.name, p.default_value.to_string()))
        .collect();

    if let Ok(board_path) = env::var("SCP_CONFIG_RS") {
        println!("cargo:rerun-if-changed={}", board_path);

        match fs::read_to_string(&board_path) {
            Ok(content) => {
                parse_and_merge(&content, &mut config);
                println!("cargo:warning=Using board config: {}", board_path);
            }
            Err(e) => {
                println!(
                    "cargo:warning=Failed to read SCP_CONFIG_RS ({}): {}",
                    board_path, e
                );
            }
        }
    }

    println!("cargo:rerun-if-env-changed=SCP_CONFIG_RS");

    let output = generate_config(&config);
    fs::write(&dest_path, output).expect("Failed to write merged config");
}

/// Merge `pub const NAME: TYPE = VALUE;` lines for known parameters
fn parse_and_merge(content: &str, config: &mut HashMap<&str, String>) {
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with("//") || !line.starts_with("pub const ") {
            continue;
        }

        if let Some((name, value)) = parse_const_line(line) {
            match CONFIG_PARAMS.iter().find(|p| p.name == name) {
                Some(param) => {
                    config.insert(param.name, value);
                }
                None => println!("cargo:warning=Unknown config parameter: {}", name),
            }
        }
    }
}

fn parse_const_line(line: &str) -> Option<(String, String)> {
    let rest = line.strip_prefix("pub const ")?.trim();

    let colon_pos = rest.find(':')?;
    let name = rest[..colon_pos].trim().to_string();

    let eq_pos = rest.find('=')?;
    let semi_pos = rest.rfind(';').unwrap_or(rest.len());
    let value = rest[eq_pos + 1..semi_pos].trim().to_string();

    Some((name, value))
}

fn generate_config(config: &HashMap<&str, String>) -> String {
    let mut output = String::new();

    output.push_str("// Auto-generated by build.rs - do not edit\n");
    output.push_str("// Framework limits merged from library defaults");
    if env::var("SCP_CONFIG_RS").is_ok() {
        output.push_str(" and the board config");
    }
    output.push_str("\n\n");

    for param in CONFIG_PARAMS {
        let value = config
            .get(param.name)
            .map(String::as_str)
            .unwrap_or(param.default_value);
        output.push_str(&format!(
            "pub const {}: {} = {};\n",
            param.name, param.rust_type, value
        ));
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_const_line() {
        let result = parse_const_line("pub const EVENT_COUNT: usize = 128;");
        assert_eq!(result, Some(("EVENT_COUNT".into(), "128".into())));

        let result = parse_const_line("pub const LOG_BUFFERED: bool = true;");
        assert_eq!(result, Some(("LOG_BUFFERED".into(), "true".into())));
    }

    #[test]
    fn test_parse_and_merge() {
        let mut config: HashMap<&str, String> = HashMap::new();
        config.insert("EVENT_COUNT", "64".into());
        config.insert("SIGNAL_COUNT", "8".into());

        let board = r#"
            // juno-like board
            pub const SIGNAL_COUNT: usize = 2 * 8;
        "#;
        parse_and_merge(board, &mut config);

        assert_eq!(config.get("EVENT_COUNT"), Some(&"64".to_string()));
        assert_eq!(config.get("SIGNAL_COUNT"), Some(&"2 * 8".to_string()));
    }
}
