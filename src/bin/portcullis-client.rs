//! Portcullis client CLI
//!
//! Drives a running portcullis server over HTTP: registers clients, requests
//! tokens with each grant type and calls the protected resource.
//!
//! ```bash
//! portcullis-client register
//! portcullis-client token --client-id abcd1234 --client-secret s3cr3tXy
//! portcullis-client protected --token <access_token>
//! portcullis-client demo
//! ```
//!
//! `PORTCULLIS_BASE_URL` may be set instead of `--base-url`.

use clap::{Args, Parser, Subcommand, ValueEnum};
use reqwest::{Client, StatusCode, header};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::process;
use url::Url;

/// Main CLI application structure
#[derive(Parser)]
#[command(
    name = "portcullis-client",
    about = "Exercise a portcullis authorization server",
    version = env!("CARGO_PKG_VERSION")
)]
struct Cli {
    /// Base URL of the portcullis server
    #[arg(long, env = "PORTCULLIS_BASE_URL", default_value = "http://localhost:3000")]
    base_url: String,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Output format
    #[arg(long, value_enum, default_value = "json-pretty")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, ValueEnum)]
enum OutputFormat {
    Json,
    JsonPretty,
}

#[derive(Subcommand)]
enum Commands {
    /// Register a new client and print its credentials
    Register,
    /// Request a token from the token endpoint
    Token(TokenArgs),
    /// Call the protected resource with an access token
    Protected(ProtectedArgs),
    /// Register, authorize, exchange, refresh and call the protected resource
    Demo,
}

#[derive(Debug, Clone, ValueEnum)]
enum Grant {
    ClientCredentials,
    AuthorizationCode,
    RefreshToken,
}

#[derive(Args)]
struct TokenArgs {
    #[arg(long, env = "PORTCULLIS_CLIENT_ID")]
    client_id: String,

    #[arg(long, env = "PORTCULLIS_CLIENT_SECRET")]
    client_secret: String,

    #[arg(long, value_enum, default_value = "client-credentials")]
    grant: Grant,

    /// Authorization code (authorization-code grant)
    #[arg(long)]
    code: Option<String>,

    /// Redirect URI the code was issued for (authorization-code grant)
    #[arg(long)]
    redirect_uri: Option<String>,

    /// Refresh token (refresh-token grant)
    #[arg(long)]
    refresh_token: Option<String>,

    #[arg(long)]
    scope: Option<String>,

    /// Send credentials with HTTP Basic instead of the form body
    #[arg(long)]
    basic: bool,
}

#[derive(Args)]
struct ProtectedArgs {
    #[arg(long)]
    token: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct Credentials {
    client_id: String,
    client_secret: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct Tokens {
    access_token: String,
    token_type: String,
    expires_in: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    refresh_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    scope: Option<String>,
}

#[derive(Default, Serialize)]
struct TokenForm<'a> {
    grant_type: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    client_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    client_secret: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    redirect_uri: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    refresh_token: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    scope: Option<&'a str>,
}

/// Application errors
#[derive(Debug)]
enum AppError {
    /// Network or HTTP client errors
    Network(reqwest::Error),
    /// JSON parsing or serialization errors
    Json(serde_json::Error),
    /// The server rejected the request
    Rejected(StatusCode, String),
    /// General application errors
    General(String),
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        AppError::Network(err)
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Json(err)
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AppError::Network(err) => write!(f, "Network error: {}", err),
            AppError::Json(err) => write!(f, "JSON error: {}", err),
            AppError::Rejected(status, body) => write!(f, "Rejected with {}: {}", status, body),
            AppError::General(msg) => write!(f, "Error: {}", msg),
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let result = match &cli.command {
        Commands::Register => register(&cli).await,
        Commands::Token(args) => token(&cli, args).await,
        Commands::Protected(args) => protected(&cli, args).await,
        Commands::Demo => demo(&cli).await,
    };

    if let Err(err) = result {
        eprintln!("{}", err);
        let code = match err {
            AppError::Rejected(status, _) if status == StatusCode::UNAUTHORIZED => 3,
            AppError::Rejected(..) => 2,
            _ => 1,
        };
        process::exit(code);
    }
}

async fn register(cli: &Cli) -> Result<(), AppError> {
    let credentials = fetch_credentials(cli, &Client::new()).await?;
    output_response(&cli.format, &credentials)
}

async fn token(cli: &Cli, args: &TokenArgs) -> Result<(), AppError> {
    let grant_type = match args.grant {
        Grant::ClientCredentials => "client_credentials",
        Grant::AuthorizationCode => "authorization_code",
        Grant::RefreshToken => "refresh_token",
    };

    let form = TokenForm {
        grant_type,
        code: args.code.as_deref(),
        redirect_uri: args.redirect_uri.as_deref(),
        refresh_token: args.refresh_token.as_deref(),
        scope: args.scope.as_deref(),
        ..Default::default()
    };

    let credentials = Credentials {
        client_id: args.client_id.clone(),
        client_secret: args.client_secret.clone(),
    };

    let tokens = request_token(cli, &Client::new(), &credentials, form, args.basic).await?;
    output_response(&cli.format, &tokens)
}

async fn protected(cli: &Cli, args: &ProtectedArgs) -> Result<(), AppError> {
    let body = call_protected(cli, &Client::new(), &args.token).await?;
    println!("{}", body);
    Ok(())
}

async fn demo(cli: &Cli) -> Result<(), AppError> {
    let client = Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()?;

    let credentials = fetch_credentials(cli, &client).await?;
    eprintln!("registered client {}", credentials.client_id);

    let issued = request_token(
        cli,
        &client,
        &credentials,
        TokenForm {
            grant_type: "client_credentials",
            ..Default::default()
        },
        false,
    )
    .await?;
    eprintln!("client credentials token expires in {}s", issued.expires_in);
    println!("{}", call_protected(cli, &client, &issued.access_token).await?);

    let (code, redirect_uri) = authorize(cli, &client, &credentials.client_id).await?;
    let exchanged = request_token(
        cli,
        &client,
        &credentials,
        TokenForm {
            grant_type: "authorization_code",
            code: Some(&code),
            redirect_uri: Some(&redirect_uri),
            ..Default::default()
        },
        true,
    )
    .await?;
    eprintln!("exchanged authorization code");

    let refresh_token = exchanged
        .refresh_token
        .ok_or_else(|| AppError::General("no refresh token issued".to_string()))?;
    let refreshed = request_token(
        cli,
        &client,
        &credentials,
        TokenForm {
            grant_type: "refresh_token",
            refresh_token: Some(&refresh_token),
            ..Default::default()
        },
        false,
    )
    .await?;
    eprintln!("rotated refresh token");

    println!("{}", call_protected(cli, &client, &refreshed.access_token).await?);
    output_response(&cli.format, &refreshed)
}

async fn fetch_credentials(cli: &Cli, client: &Client) -> Result<Credentials, AppError> {
    let url = format!("{}/credentials", cli.base_url);
    if cli.verbose {
        eprintln!("GET {}", url);
    }

    let response = client.get(&url).send().await?;
    match response.status() {
        StatusCode::OK => Ok(response.json().await?),
        status => Err(AppError::Rejected(status, response.text().await?)),
    }
}

async fn request_token(
    cli: &Cli,
    client: &Client,
    credentials: &Credentials,
    mut form: TokenForm<'_>,
    basic: bool,
) -> Result<Tokens, AppError> {
    let url = format!("{}/token", cli.base_url);
    if cli.verbose {
        eprintln!("POST {} grant_type={}", url, form.grant_type);
    }

    let mut request = client.post(&url);
    if basic {
        request = request.basic_auth(&credentials.client_id, Some(&credentials.client_secret));
    } else {
        form.client_id = Some(&credentials.client_id);
        form.client_secret = Some(&credentials.client_secret);
    }

    let response = request.form(&form).send().await?;
    match response.status() {
        StatusCode::OK => Ok(response.json().await?),
        status => Err(AppError::Rejected(status, response.text().await?)),
    }
}

async fn authorize(
    cli: &Cli,
    client: &Client,
    client_id: &str,
) -> Result<(String, String), AppError> {
    let url = format!("{}/authorize", cli.base_url);
    if cli.verbose {
        eprintln!("GET {}", url);
    }

    let response = client
        .get(&url)
        .query(&[
            ("response_type", "code"),
            ("client_id", client_id),
            ("state", "portcullis-client"),
        ])
        .send()
        .await?;

    if response.status() != StatusCode::FOUND {
        let status = response.status();
        return Err(AppError::Rejected(status, response.text().await?));
    }

    let location = response
        .headers()
        .get(header::LOCATION)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| AppError::General("authorize response had no Location".to_string()))?;
    let mut location = Url::parse(location)
        .map_err(|e| AppError::General(format!("invalid Location: {}", e)))?;

    let code = location
        .query_pairs()
        .find(|(key, _)| key == "code")
        .map(|(_, value)| value.to_string())
        .ok_or_else(|| AppError::General("authorize redirect had no code".to_string()))?;

    location.set_query(None);
    let redirect_uri = location.as_str().trim_end_matches('/').to_string();

    Ok((code, redirect_uri))
}

async fn call_protected(cli: &Cli, client: &Client, token: &str) -> Result<String, AppError> {
    let url = format!("{}/protected", cli.base_url);
    if cli.verbose {
        eprintln!("GET {}", url);
    }

    let response = client.get(&url).bearer_auth(token).send().await?;
    match response.status() {
        StatusCode::OK => Ok(response.text().await?),
        status => Err(AppError::Rejected(status, response.text().await?)),
    }
}

/// Output response data in the requested format
fn output_response<T: Serialize>(format: &OutputFormat, data: &T) -> Result<(), AppError> {
    let value: Value = serde_json::to_value(data)?;
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string(&value)?),
        OutputFormat::JsonPretty => println!("{}", serde_json::to_string_pretty(&value)?),
    }
    Ok(())
}
