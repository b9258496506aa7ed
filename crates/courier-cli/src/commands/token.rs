use crate::auth::{resolve_token, TokenStore};
use crate::cli::TokenCommands;
use crate::commands::common::read_piped_stdin;
use crate::error::CliError;

pub fn run_token(command: TokenCommands) -> Result<(), CliError> {
    let store = TokenStore::new();

    match command {
        TokenCommands::Set { token } => {
            let token = match token {
                Some(token) => token,
                None => read_piped_stdin()?.ok_or(CliError::EmptyToken)?,
            };
            store.save(&token)?;
            println!("Bot token saved to the keychain");
        }
        TokenCommands::Clear => {
            store.clear()?;
            println!("Bot token removed from the keychain");
        }
        TokenCommands::Status => match resolve_token(&store)? {
            Some((_, source)) => println!("Bot token configured ({})", source.label()),
            None => println!("Bot token is not configured."),
        },
    }

    Ok(())
}
