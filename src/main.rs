use clap::Parser;
use tokenward::cli::{
    ACCESS_SECRET_ENV, Args, REFRESH_SECRET_ENV, build_config, init_logging, load_secret,
    open_database, validate_token_ttls,
};
use tokenward::{create_app, init_cleanup, run_server};
use tracing::{error, info};

#[tokio::main]
async fn main() {
    let args = Args::parse();

    init_logging(&args.log_format);

    if let Err(e) = validate_token_ttls(args.access_token_ttl, args.refresh_token_ttl) {
        error!("{}", e);
        std::process::exit(1);
    }

    let Some(access_secret) = load_secret(ACCESS_SECRET_ENV, args.access_secret_file.as_deref())
    else {
        std::process::exit(1);
    };
    let Some(refresh_secret) =
        load_secret(REFRESH_SECRET_ENV, args.refresh_secret_file.as_deref())
    else {
        std::process::exit(1);
    };

    let Some(db) = open_database(&args.database).await else {
        std::process::exit(1);
    };

    let config = build_config(&args, db, access_secret, refresh_secret);
    let app = match create_app(&config) {
        Ok(app) => app,
        Err(e) => {
            error!(error = %e, "Invalid signing secrets");
            std::process::exit(1);
        }
    };

    init_cleanup(&config.db).await;

    let addr = format!("0.0.0.0:{}", args.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .unwrap_or_else(|e| {
            error!(address = %addr, error = %e, "Failed to bind");
            std::process::exit(1);
        });

    match listener.local_addr() {
        Ok(local_addr) => info!(
            address = %local_addr,
            environment = ?args.environment,
            revoke_on_reuse = args.revoke_on_reuse,
            "Listening"
        ),
        Err(e) => error!(error = %e, "Failed to read local address"),
    }

    if let Err(e) = run_server(app, listener).await {
        error!(error = %e, "Server error");
        std::process::exit(1);
    }
}
