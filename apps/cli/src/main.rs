use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use client_core::{
    create_room_or_fallback, describe_connect_error, parse_room_reference,
    resolve_room_reference, ClientConfig, ConnectError, CredentialFetcher, HttpCredentialFetcher,
    HttpRoomDirectory,
};
use shared::api::{CreateRoomRequest, TokenRequest};
use shared::domain::DEFAULT_MAX_SPEAKERS;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "clubspaces", about = "ClubSpaces room directory and credential tool")]
struct Cli {
    #[arg(long, env = "CLUBSPACES_SERVER_URL", default_value = "http://127.0.0.1:8443")]
    server_url: String,
    #[arg(long, env = "CLUBSPACES_IDENTITY")]
    identity: Option<String>,
    #[arg(long, env = "CLUBSPACES_NAME")]
    name: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Registers a room, falling back to a local ad-hoc id when the server is down.
    CreateRoom {
        name: String,
        #[arg(long)]
        description: Option<String>,
        #[arg(long = "topic")]
        topics: Vec<String>,
        #[arg(long)]
        private: bool,
        #[arg(long, default_value_t = DEFAULT_MAX_SPEAKERS)]
        max_speakers: u32,
    },
    /// Fetches a session credential for a room id, room link or invite link.
    Credential { room: String },
    /// Prints the room id a room link or invite link points at.
    Resolve { reference: String },
}

impl Cli {
    fn client_config(&self) -> ClientConfig {
        ClientConfig {
            server_url: self.server_url.clone(),
            participant_identity: self.identity.clone(),
            participant_name: self.name.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    let cli = Cli::parse();
    let config = cli.client_config();
    let directory = HttpRoomDirectory::new(&config.server_url)?;

    match cli.command {
        Command::CreateRoom {
            name,
            description,
            topics,
            private,
            max_speakers,
        } => {
            let host_id = config
                .participant_identity
                .clone()
                .context("--identity is required to host a room")?;
            let request = CreateRoomRequest {
                name,
                description,
                topics,
                is_public: !private,
                host_name: config.participant_name.clone().unwrap_or_else(|| host_id.clone()),
                host_id,
                max_speakers,
            };
            let created = create_room_or_fallback(&directory, &request).await;
            info!("cli: room ready room_id={} ad_hoc={}", created.room_id, created.ad_hoc);
            println!(
                "{}",
                serde_json::json!({
                    "roomId": created.room_id,
                    "inviteToken": created.invite_token,
                    "adHoc": created.ad_hoc,
                })
            );
        }
        Command::Credential { room } => {
            let room_name = resolve_room_reference(&directory, parse_room_reference(&room)).await;
            let fetcher = HttpCredentialFetcher::new(&config.server_url)?;
            let request = TokenRequest {
                room_name: room_name.clone(),
                participant_name: config.participant_name.clone(),
                participant_identity: config.participant_identity.clone(),
            };
            match fetcher.fetch_credential(&request).await {
                Ok(credential) => println!(
                    "{}",
                    serde_json::json!({
                        "roomName": room_name,
                        "token": credential.token,
                        "url": credential.url,
                    })
                ),
                Err(err) => {
                    anyhow::bail!(describe_connect_error(&ConnectError::from(err)));
                }
            }
        }
        Command::Resolve { reference } => {
            let room_id = resolve_room_reference(&directory, parse_room_reference(&reference)).await;
            println!("{room_id}");
        }
    }

    Ok(())
}
