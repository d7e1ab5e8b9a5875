use anyhow::{Context, Result};
use async_trait::async_trait;
use std::io::{self, BufRead, Write};
use tracing::info;

use super::{Command, CommandContext};
use crate::config::Config;

/// Command to set up Google Calendar authentication
pub struct AuthGoogleCommand;

/// Command to prompt for xMatters credentials and save them
pub struct ConfigureCommand;

#[async_trait]
impl Command for AuthGoogleCommand {
    async fn execute(&mut self, context: &CommandContext) -> Result<()> {
        info!("Setting up Google Calendar authentication...");

        let token_store = match context.token_store() {
            Ok(store) => store,
            Err(e) => {
                println!("❌ Google Calendar not configured: {}", e);
                println!("Add your OAuth2 desktop-app credentials to {}:", Config::get_config_path()?.display());
                println!();
                println!("[google_calendar]");
                println!("client_id = \"your-client-id.apps.googleusercontent.com\"");
                println!("client_secret = \"your-client-secret\"");
                println!("redirect_uri = \"http://localhost:8080/auth/callback\"");
                println!("calendar_name = \"On Call\"");
                return Ok(());
            }
        };

        if token_store.is_authenticated().await {
            println!("✅ Already authenticated with Google Calendar");
            return Ok(());
        }

        let (auth_url, _csrf_token) = token_store.get_auth_url()?;

        println!("\n📋 Follow these steps:");
        println!("1. Open this URL in your browser:");
        println!("   {}", auth_url);
        println!("\n2. Grant access to your Google Calendar");
        println!("3. Copy the `code` parameter from the redirect URL");

        let auth_code = {
            let stdin = io::stdin();
            let mut stdout = io::stdout();
            prompt_value(&mut stdin.lock(), &mut stdout, "🔑 Enter authorization code", "")?
        };

        if auth_code.is_empty() {
            println!("❌ No authorization code provided");
            return Ok(());
        }

        println!("🔄 Exchanging authorization code for access token...");
        token_store
            .authenticate_with_code(&auth_code)
            .await
            .context("Google Calendar authentication failed")?;

        println!("✅ Token saved to {}", token_store.token_file_path().display());
        Ok(())
    }
}

#[async_trait]
impl Command for ConfigureCommand {
    async fn execute(&mut self, context: &CommandContext) -> Result<()> {
        let mut updated = context.config.read().clone();

        {
            let stdin = io::stdin();
            let mut input = stdin.lock();
            let mut output = io::stdout();
            let xmatters = &mut updated.xmatters;

            xmatters.domain = prompt_value(&mut input, &mut output, "xMatters domain", &xmatters.domain)?;
            xmatters.api_key = prompt_value(&mut input, &mut output, "xMatters API key", &xmatters.api_key)?;
            xmatters.api_secret =
                prompt_value(&mut input, &mut output, "xMatters API secret", &xmatters.api_secret)?;
            xmatters.username = prompt_value(&mut input, &mut output, "xMatters username", &xmatters.username)?;
        }

        updated.save().await.context("Failed to save configuration")?;
        *context.config.write() = updated;

        println!("✅ Configuration saved to {}", Config::get_config_path()?.display());
        Ok(())
    }
}

/// Ask for a value; a blank answer keeps `current`
fn prompt_value<R, W>(input: &mut R, output: &mut W, label: &str, current: &str) -> io::Result<String>
where
    R: BufRead,
    W: Write,
{
    if current.is_empty() {
        write!(output, "{}: ", label)?;
    } else {
        write!(output, "{} (leave blank to keep current): ", label)?;
    }
    output.flush()?;

    let mut line = String::new();
    input.read_line(&mut line)?;
    let value = line.trim();

    Ok(if value.is_empty() {
        current.to_string()
    } else {
        value.to_string()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_prompt_takes_trimmed_answer() {
        let mut input = Cursor::new("  acme.xmatters.com \n");
        let mut output = Vec::new();

        let value = prompt_value(&mut input, &mut output, "xMatters domain", "").unwrap();
        assert_eq!(value, "acme.xmatters.com");
        assert_eq!(String::from_utf8(output).unwrap(), "xMatters domain: ");
    }

    #[test]
    fn test_blank_answer_keeps_current_value() {
        let mut input = Cursor::new("\n");
        let mut output = Vec::new();

        let value = prompt_value(&mut input, &mut output, "xMatters username", "alice").unwrap();
        assert_eq!(value, "alice");
        assert!(String::from_utf8(output).unwrap().contains("leave blank"));
    }

    #[test]
    fn test_end_of_input_keeps_current_value() {
        let mut input = Cursor::new("");
        let mut output = Vec::new();

        let value = prompt_value(&mut input, &mut output, "xMatters API key", "key").unwrap();
        assert_eq!(value, "key");
    }
}
