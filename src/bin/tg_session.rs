//! One-time interactive login that prints a `TG_SESSION_STRING` for the worker.
//!
//! Needs an API id and hash from <https://my.telegram.org/apps>, the account's
//! phone number and the login code Telegram sends to it.

use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use grammers_client::{Client, Config as ClientConfig, InitParams, SignInError};
use grammers_session::Session;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines, Stdin};

type Input = Lines<BufReader<Stdin>>;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("\nError: {e:#}");
        std::process::exit(1);
    }
}

async fn prompt(input: &mut Input, label: &str) -> Result<String> {
    let mut stdout = tokio::io::stdout();
    stdout.write_all(label.as_bytes()).await?;
    stdout.flush().await?;

    let line = input
        .next_line()
        .await
        .context("Failed to read from stdin")?
        .context("Cancelled by user")?;
    Ok(line.trim().to_string())
}

async fn run() -> Result<()> {
    let _ = dotenvy::dotenv();
    let mut input = BufReader::new(tokio::io::stdin()).lines();

    println!("{}", "=".repeat(60));
    println!("Telegram session generator");
    println!("{}", "=".repeat(60));
    println!();
    println!("Run this once to produce a session string for the worker.");
    println!();

    let api_id: i32 = prompt(&mut input, "Enter API ID: ")
        .await?
        .parse()
        .context("API ID must be a number")?;
    let api_hash = prompt(&mut input, "Enter API Hash: ").await?;
    if api_hash.is_empty() {
        bail!("API Hash is required");
    }

    println!("\nConnecting to Telegram...");
    let client = Client::connect(ClientConfig {
        session: Session::new(),
        api_id,
        api_hash,
        params: InitParams::default(),
    })
    .await
    .context("Failed to connect to Telegram")?;

    if !client.is_authorized().await? {
        let phone = prompt(
            &mut input,
            "Enter your phone number (with country code, e.g. +79001234567): ",
        )
        .await?;
        let token = client
            .request_login_code(&phone)
            .await
            .context("Failed to request login code")?;

        println!("\nA login code has been sent to your Telegram app.");
        let code = prompt(&mut input, "Enter the code: ").await?;

        match client.sign_in(&token, &code).await {
            Ok(_) => {}
            Err(SignInError::PasswordRequired(password_token)) => {
                let password = prompt(
                    &mut input,
                    "Two-step verification is enabled. Enter your password: ",
                )
                .await?;
                client
                    .check_password(password_token, password.as_bytes())
                    .await
                    .context("Password check failed")?;
            }
            Err(e) => return Err(e).context("Sign in failed"),
        }
    }

    let me = client.get_me().await?;
    println!(
        "\nAuthenticated as: {} (@{})",
        me.first_name(),
        me.username().unwrap_or("-")
    );

    let channel = std::env::var("TG_CHANNEL_USERNAME").unwrap_or_else(|_| "itatmisis".to_string());
    let channel = channel.trim_start_matches('@');
    println!("\nTesting channel access...");
    match client.resolve_username(channel).await {
        Ok(Some(chat)) => println!("Can access channel: {}", chat.name()),
        Ok(None) => println!("Channel @{channel} was not found."),
        Err(e) => {
            println!("Cannot access @{channel}: {e}");
            println!("Make sure the account can see the channel.");
        }
    }

    let session = BASE64.encode(client.session().save());

    println!();
    println!("{}", "=".repeat(60));
    println!("YOUR SESSION STRING (copy this to .env):");
    println!("{}", "=".repeat(60));
    println!();
    println!("TG_SESSION_STRING={session}");
    println!();
    println!("Keep this string secret: it grants full access to the account.");

    Ok(())
}
