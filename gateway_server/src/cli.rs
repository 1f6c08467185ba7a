use std::{env, env::VarError};

use chrono::Duration;
use gateway_auth::{db_types::RoleId, ApiKeyManager, SqliteDatabase, DEFAULT_API_KEY_TTL};

use crate::{config::ServerConfig, errors::ServerError};

/// The few things the server binary can be asked to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CliCommand {
    RunServer,
    Help,
    CreateKey { name: String, role_id: RoleId, ttl: Option<Duration> },
}

/// There's no real CLI for the server, so just do quick 'n dirty. `create-key` bootstraps the first API key; anything
/// else prints the help.
pub fn parse_command_line_args<I: IntoIterator<Item = String>>(args: I) -> CliCommand {
    let args = args.into_iter().skip(1).collect::<Vec<String>>();
    match args.as_slice() {
        [] => CliCommand::RunServer,
        [cmd, name, role, rest @ ..] if cmd == "create-key" && rest.len() <= 1 => {
            let Ok(role_id) = role.parse::<i64>().map(RoleId) else {
                return CliCommand::Help;
            };
            let ttl = match rest.first().map(|s| s.parse::<i64>()) {
                None => Some(DEFAULT_API_KEY_TTL),
                Some(Ok(0)) => None,
                Some(Ok(minutes)) if minutes > 0 => match Duration::try_minutes(minutes) {
                    Some(ttl) => Some(ttl),
                    None => return CliCommand::Help,
                },
                Some(_) => return CliCommand::Help,
            };
            CliCommand::CreateKey { name: name.clone(), role_id, ttl }
        },
        _ => CliCommand::Help,
    }
}

pub fn display_help() {
    display_readme();
    display_envs();
}

fn display_readme() {
    const README: &str = include_str!("./cli-help.txt");
    println!("\n{README}\n");
}

fn display_envs() {
    // Be explicit about which envars to print, so as to avoid accidentally exposing secrets
    const DISPLAY_ENVS: [&str; 9] = [
        "RUST_LOG",
        "PGW_HOST",
        "PGW_PORT",
        "PGW_DATABASE_URL",
        "PGW_DB_MAX_CONNECTIONS",
        "PGW_REQUIRE_API_KEY",
        "PGW_USE_X_FORWARDED_FOR",
        "PGW_USE_FORWARDED",
        "PGW_NONCE_PURGE_INTERVAL",
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

/// Creates an API key directly in the database and prints it. The raw key is shown once and never logged.
pub async fn create_key(
    config: &ServerConfig,
    name: &str,
    role_id: RoleId,
    ttl: Option<Duration>,
) -> Result<(), ServerError> {
    let db = SqliteDatabase::new_with_url(&config.database_url, 1)
        .await
        .map_err(|e| ServerError::InitializeError(e.to_string()))?;
    db.migrate().await.map_err(|e| ServerError::InitializeError(e.to_string()))?;
    let key = ApiKeyManager::new(db).generate(name, role_id, ttl).await?;
    println!("API key '{}' created for role {role_id}", key.record.name);
    println!("  id:      {}", key.record.id);
    match key.record.expires_at {
        Some(t) => println!("  expires: {t}"),
        None => println!("  expires: never"),
    }
    println!("  key:     {}", key.raw_key.reveal());
    println!("Store the key now. It cannot be retrieved again.");
    Ok(())
}
