use dotenvy::dotenv;
use gateway_server::{
    cli::{create_key, display_help, parse_command_line_args, CliCommand},
    config::ServerConfig,
    server::run_server,
};
use log::info;

#[actix_web::main]
async fn main() {
    dotenv().ok();
    env_logger::init();
    let command = parse_command_line_args(std::env::args());
    let config = ServerConfig::from_env_or_default();
    let result = match command {
        CliCommand::Help => {
            display_help();
            return;
        },
        CliCommand::CreateKey { name, role_id, ttl } => create_key(&config, &name, role_id, ttl).await,
        CliCommand::RunServer => {
            info!("🚀️ Starting server on {}:{}", config.host, config.port);
            run_server(config).await
        },
    };
    match result {
        Ok(_) => println!("Bye!"),
        Err(e) => eprintln!("{e}"),
    }
}
