use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use salon::booking::{Booking, BookingClient};
use salon::models::{Appointment, Master, NewAppointment, NewMaster, NewService, NewUser, Service, Sex, User};
use salon::storage::{FileStorage, Storage};
use salon::theme::Theme;
use salon::{ApiClient, ApiError, ClientConfig, Creatable, Listing, SessionStore, StorageError};
use serde::Serialize;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[cfg(test)]
#[path = "main_test.rs"]
mod main_test;

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("not logged in; run `salon-cli login` first")]
    NotLoggedIn,
    #[error("session expired; logged out")]
    SessionExpired,
    #[error("invalid JSON output: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

#[derive(Parser, Debug)]
#[command(name = "salon-cli", about = "Salon admin console")]
struct Cli {
    /// API root including the `/api` prefix.
    #[arg(long, env = "SALON_API_URL")]
    base_url: Option<String>,

    /// Directory holding the persisted session.
    #[arg(long, env = "SALON_STATE_DIR")]
    state_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    Login {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
    Register {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
        #[arg(long)]
        name: Option<String>,
    },
    Logout,
    Whoami,
    Users(UsersCommand),
    Masters(MastersCommand),
    Services(ServicesCommand),
    Appointments(AppointmentsCommand),
    Theme(ThemeCommand),
    Booking(BookingCommand),
}

#[derive(Args, Debug)]
struct UsersCommand {
    #[command(subcommand)]
    command: UsersSubcommand,
}

#[derive(Subcommand, Debug)]
enum UsersSubcommand {
    List,
    Delete { id: Uuid },
}

#[derive(Args, Debug)]
struct MastersCommand {
    #[command(subcommand)]
    command: MastersSubcommand,
}

#[derive(Subcommand, Debug)]
enum MastersSubcommand {
    List,
    Create {
        #[arg(long)]
        name: String,
        #[arg(long, default_value = "female")]
        sex: Sex,
        #[arg(long)]
        phone: String,
        #[arg(long, default_value_t = 0)]
        experience: u32,
        #[arg(long)]
        specialty: String,
    },
    Delete {
        id: Uuid,
    },
}

#[derive(Args, Debug)]
struct ServicesCommand {
    #[command(subcommand)]
    command: ServicesSubcommand,
}

#[derive(Subcommand, Debug)]
enum ServicesSubcommand {
    List,
    Create {
        #[arg(long)]
        name: String,
        #[arg(long, default_value = "")]
        description: String,
        #[arg(long)]
        price: f64,
        #[arg(long, default_value_t = 60)]
        duration: u32,
    },
    Delete {
        id: Uuid,
    },
}

#[derive(Args, Debug)]
struct AppointmentsCommand {
    #[command(subcommand)]
    command: AppointmentsSubcommand,
}

#[derive(Subcommand, Debug)]
enum AppointmentsSubcommand {
    List,
    Create {
        /// ISO-8601 local date-time, e.g. `2024-12-20T10:00:00`.
        #[arg(long)]
        date_time: String,
        #[arg(long)]
        user_id: Uuid,
        #[arg(long)]
        master_id: Uuid,
        #[arg(long)]
        service_id: Uuid,
    },
    Delete {
        id: Uuid,
    },
}

#[derive(Args, Debug)]
struct ThemeCommand {
    #[command(subcommand)]
    command: ThemeSubcommand,
}

#[derive(Subcommand, Debug)]
enum ThemeSubcommand {
    Show,
    Toggle,
}

#[derive(Args, Debug)]
struct BookingCommand {
    #[command(subcommand)]
    command: BookingSubcommand,
}

#[derive(Subcommand, Debug)]
enum BookingSubcommand {
    Submit {
        #[arg(long)]
        name: String,
        #[arg(long)]
        phone: String,
        #[arg(long)]
        service: String,
        #[arg(long)]
        comment: Option<String>,
    },
    List,
}

impl Command {
    /// Resource commands authenticate with the stored session token.
    fn uses_session(&self) -> bool {
        matches!(self, Self::Users(_) | Self::Masters(_) | Self::Services(_) | Self::Appointments(_))
    }
}

struct CliContext {
    config: ClientConfig,
    storage: Arc<dyn Storage>,
    api: ApiClient,
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let result = match build_context(&cli) {
        Ok(ctx) => execute(&ctx, cli.command).await,
        Err(e) => Err(e),
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{e}");
            ExitCode::FAILURE
        }
    }
}

/// Run one command. A 401 on a session command ends the stored session.
async fn execute(ctx: &CliContext, command: Command) -> Result<(), CliError> {
    let uses_session = command.uses_session();
    let result = run(ctx, command).await;
    if let Err(CliError::Api(e)) = &result {
        if uses_session && e.is_unauthorized() {
            tracing::warn!("server rejected the stored token");
            ctx.api.logout()?;
            return Err(CliError::SessionExpired);
        }
    }
    result
}

fn build_context(cli: &Cli) -> Result<CliContext, CliError> {
    let mut config = ClientConfig::from_env();
    if let Some(url) = &cli.base_url {
        config = config.with_api_url(url);
    }
    if let Some(dir) = &cli.state_dir {
        config.state_dir.clone_from(dir);
    }

    let storage: Arc<dyn Storage> = Arc::new(FileStorage::open(&config.state_dir)?);
    let session = Arc::new(SessionStore::restore(storage.clone())?);
    let api = ApiClient::new(&config, session)?;
    Ok(CliContext { config, storage, api })
}

async fn run(ctx: &CliContext, command: Command) -> Result<(), CliError> {
    match command {
        Command::Login { email, password } => {
            ctx.api.login(&email, &password).await?;
            println!("logged in as {email}");
            Ok(())
        }
        Command::Register { email, password, name } => {
            let user = ctx.api.register(&NewUser { email, password, name }).await?;
            print_json(&user)
        }
        Command::Logout => {
            ctx.api.logout()?;
            println!("logged out");
            Ok(())
        }
        Command::Whoami => match ctx.api.session().user() {
            Some(user) => print_json(&user),
            None => Err(CliError::NotLoggedIn),
        },
        Command::Users(users) => run_users(ctx, users).await,
        Command::Masters(masters) => run_masters(ctx, masters).await,
        Command::Services(services) => run_services(ctx, services).await,
        Command::Appointments(appointments) => run_appointments(ctx, appointments).await,
        Command::Theme(theme) => run_theme(ctx, theme),
        Command::Booking(booking) => run_booking(ctx, booking).await,
    }
}

fn require_session(ctx: &CliContext) -> Result<(), CliError> {
    if ctx.api.session().is_authenticated() { Ok(()) } else { Err(CliError::NotLoggedIn) }
}

async fn run_users(ctx: &CliContext, users: UsersCommand) -> Result<(), CliError> {
    require_session(ctx)?;
    match users.command {
        UsersSubcommand::List => print_json(&ctx.api.list_users().await?),
        UsersSubcommand::Delete { id } => delete_and_list::<User>(ctx, id).await,
    }
}

async fn run_masters(ctx: &CliContext, masters: MastersCommand) -> Result<(), CliError> {
    require_session(ctx)?;
    match masters.command {
        MastersSubcommand::List => print_json(&ctx.api.list_masters().await?),
        MastersSubcommand::Create { name, sex, phone, experience, specialty } => {
            create_and_list::<Master>(ctx, &NewMaster { name, sex, phone, experience, specialty }).await
        }
        MastersSubcommand::Delete { id } => delete_and_list::<Master>(ctx, id).await,
    }
}

async fn run_services(ctx: &CliContext, services: ServicesCommand) -> Result<(), CliError> {
    require_session(ctx)?;
    match services.command {
        ServicesSubcommand::List => print_json(&ctx.api.list_services().await?),
        ServicesSubcommand::Create { name, description, price, duration } => {
            create_and_list::<Service>(ctx, &NewService { name, description, price, duration }).await
        }
        ServicesSubcommand::Delete { id } => delete_and_list::<Service>(ctx, id).await,
    }
}

async fn run_appointments(ctx: &CliContext, appointments: AppointmentsCommand) -> Result<(), CliError> {
    require_session(ctx)?;
    match appointments.command {
        AppointmentsSubcommand::List => print_json(&ctx.api.list_appointments().await?),
        AppointmentsSubcommand::Create { date_time, user_id, master_id, service_id } => {
            let payload = NewAppointment { date_time, user_id, master_id, service_id };
            create_and_list::<Appointment>(ctx, &payload).await
        }
        AppointmentsSubcommand::Delete { id } => delete_and_list::<Appointment>(ctx, id).await,
    }
}

/// Create, then print the created record and the re-fetched list.
async fn create_and_list<R>(ctx: &CliContext, payload: &R::New) -> Result<(), CliError>
where
    R: Creatable + Serialize,
{
    #[derive(Serialize)]
    struct Created<'a, R> {
        created: &'a R,
        items: &'a [R],
    }

    let mut listing = Listing::<R>::new();
    let created = listing.create(&ctx.api, payload).await?;
    print_json(&Created { created: &created, items: listing.items() })
}

async fn delete_and_list<R>(ctx: &CliContext, id: Uuid) -> Result<(), CliError>
where
    R: salon::Resource + Serialize,
{
    let mut listing = Listing::<R>::new();
    listing.delete(&ctx.api, id).await?;
    print_json(&listing.items())
}

fn run_theme(ctx: &CliContext, theme: ThemeCommand) -> Result<(), CliError> {
    let current = match theme.command {
        ThemeSubcommand::Show => Theme::load(ctx.storage.as_ref())?,
        ThemeSubcommand::Toggle => Theme::toggle(ctx.storage.as_ref())?,
    };
    println!("{current}");
    Ok(())
}

async fn run_booking(ctx: &CliContext, booking: BookingCommand) -> Result<(), CliError> {
    let client = BookingClient::from_config(&ctx.config)?;
    match booking.command {
        BookingSubcommand::Submit { name, phone, service, comment } => {
            let mut booking = Booking::new(&name, &phone, &service);
            booking.comment = comment;
            print_json(&client.submit(&booking).await?)
        }
        BookingSubcommand::List => print_json(&client.list().await?),
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), CliError> {
    let rendered = serde_json::to_string_pretty(value)?;
    println!("{rendered}");
    Ok(())
}
