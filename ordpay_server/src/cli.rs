use std::{env, env::VarError};

/// The server has no real CLI. Any argument prints the help text and the current configuration.
pub fn handle_command_line_args() -> bool {
    let has_cli_args = env::args().count() > 1;
    if has_cli_args {
        display_readme();
        display_envs();
    }
    has_cli_args
}

fn display_readme() {
    const README: &str = include_str!("./cli-help.txt");
    println!("\n{README}\n");
}

fn display_envs() {
    // Never list secrets here
    const DISPLAY_ENVS: [&str; 15] = [
        "RUST_LOG",
        "ORDPAY_HOST",
        "ORDPAY_PORT",
        "ORDPAY_DATABASE_URL",
        "ORDPAY_CURRENCY",
        "ORDPAY_PROVIDER_BASE_URL",
        "ORDPAY_PROVIDER_TIMEOUT_SECS",
        "ORDPAY_VERIFY_MAX_ATTEMPTS",
        "ORDPAY_IDEMPOTENCY_WINDOW_MINS",
        "ORDPAY_UNPAID_ORDER_TIMEOUT",
        "ORDPAY_RATE_LIMIT_CREATE_ORDER",
        "ORDPAY_RATE_LIMIT_VERIFY_PAYMENT",
        "ORDPAY_USE_X_FORWARDED_FOR",
        "ORDPAY_USE_FORWARDED",
        "ORDPAY_EVENT_BUFFER_SIZE",
    ];

    println!("Current environment values (EXCLUDING variables that contain secrets):");
    DISPLAY_ENVS.iter().for_each(|&name| {
        let val = match env::var(name) {
            Ok(s) => s,
            Err(VarError::NotPresent) => "Not set".into(),
            Err(VarError::NotUnicode(s)) => format!("Invalid value: {}", s.to_string_lossy()),
        };
        println!("  {name:<35} {val:<15}");
    })
}
