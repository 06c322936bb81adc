use cadre::credentials::PasswordPolicy;
use cadre::{jwks, settings, storage, web};
use clap::Parser;
use migration::{Migrator, MigratorTrait};
use miette::{IntoDiagnostic, Result};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(
    name = "cadre",
    version,
    about = "Identity and authorization service for organization backends"
)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    // logging
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(env_filter).init();

    let cli = Cli::parse();

    // load settings
    let settings = settings::Settings::load(&cli.config)?;
    tracing::info!(?settings, "Loaded configuration");

    // init storage and apply pending migrations
    let db = storage::init(&settings.database).await?;
    Migrator::up(&db, None).await.into_diagnostic()?;

    // seed the built-in roles and the bootstrap admin account
    let policy = PasswordPolicy::new(&settings.auth.password_rule)
        .map_err(|e| miette::miette!("bad password rule: {e}"))?;
    ensure_defaults(&db, &policy).await?;

    // init jwks (generate if missing)
    let jwks_mgr = jwks::JwksManager::new(settings.keys.clone())
        .await
        .map_err(|e| miette::miette!("jwks init failed: {e}"))?;

    // start web server
    web::serve(settings, db, jwks_mgr).await?;
    Ok(())
}

async fn ensure_defaults(db: &sea_orm::DatabaseConnection, policy: &PasswordPolicy) -> Result<()> {
    for (name, description) in [
        ("admin", "Full administrative access"),
        ("user", "Default role for every account"),
    ] {
        if storage::get_role_by_name(db, name)
            .await
            .into_diagnostic()?
            .is_none()
        {
            storage::create_role(db, name, description)
                .await
                .into_diagnostic()?;
            tracing::info!(role = name, "Created built-in role");
        }
    }

    if storage::get_user_by_login(db, "admin")
        .await
        .into_diagnostic()?
        .is_none()
    {
        let admin = storage::create_user(
            db,
            policy,
            storage::NewUser {
                username: "admin".to_string(),
                password: "password123".to_string(),
                email: Some("admin@example.com".to_string()),
                first_name: "Admin".to_string(),
                last_name: "User".to_string(),
                phone: None,
            },
        )
        .await
        .into_diagnostic()?;

        if let Some(role) = storage::get_role_by_name(db, "admin")
            .await
            .into_diagnostic()?
        {
            storage::add_user_role(db, admin.id, role.id)
                .await
                .into_diagnostic()?;
        }
        tracing::info!("Created default admin user (username: admin, password: password123)");
    }
    Ok(())
}
