use anyhow::Context;

use inbox_triage::config::AppConfig;
use inbox_triage::error::{Error, MailError};
use inbox_triage::pipeline::processor;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = AppConfig::from_env().unwrap_or_else(|e| {
        eprintln!("Error: {}", e);
        eprintln!("  export EMAIL=you@gmail.com");
        eprintln!("  export EMAIL_PASSWORD='abcd efgh ijkl mnop'");
        eprintln!("  export OPENROUTER_API_KEY=sk-or-...");
        std::process::exit(1);
    });

    eprintln!("📬 Inbox Triage v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Mailbox: {}", config.mail.address);
    eprintln!(
        "   Server: {}:{} ({})",
        config.mail.imap_host, config.mail.imap_port, config.mail.folder
    );
    eprintln!(
        "   Window: last {} days, up to {} messages",
        config.mail.since_days, config.mail.max_messages
    );
    eprintln!("   Model: {}\n", config.classifier.model);

    let report = match processor::run(&config).await {
        Ok(report) => report,
        Err(Error::Mail(MailError::Auth(reason))) => {
            eprintln!("Error: the mail server rejected the login ({})", reason);
            print_auth_help(&config.mail.imap_host);
            std::process::exit(2);
        }
        Err(e) => return Err(e).context("Triage run failed"),
    };

    if report.is_empty() {
        eprintln!("   No messages found in the last {} days.", config.mail.since_days);
    }

    let json = serde_json::to_string_pretty(&report).context("Failed to serialize report")?;
    println!("{json}");

    Ok(())
}

fn print_auth_help(host: &str) {
    eprintln!();
    eprintln!("  Most providers refuse your normal password over IMAP.");
    if host.ends_with("gmail.com") {
        eprintln!("  For Gmail:");
        eprintln!("    1. Enable 2-Step Verification on your Google account");
        eprintln!("    2. Create an app password at https://myaccount.google.com/apppasswords");
        eprintln!("    3. Make sure IMAP is enabled in Gmail settings");
    } else {
        eprintln!("  Create an app-specific password for IMAP and check that IMAP is enabled.");
    }
    eprintln!("  Then set it as EMAIL_PASSWORD (spaces are fine).");
}
