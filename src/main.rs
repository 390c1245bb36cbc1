use std::{error::Error, io, process, sync::Arc, time::Duration};

use clap::{command, Parser, ValueHint};
use log::{debug, error, info, warn, LevelFilter};
use tokio::{sync::mpsc, time};

use tunehouse::{
    config::Config,
    controller::Headless,
    error::ErrorKind,
    gateway::Gateway,
    lyrics::LyricsOvh,
    party::{PartyId, PartyManager, PartyView},
    provider::Provider,
    session::{Command, Services, Session},
    signal,
    store::NowPlaying,
};

/// Profile to display when not built in release mode.
#[cfg(debug_assertions)]
const BUILD_PROFILE: &str = "debug";
/// Profile to display when built in release mode.
#[cfg(not(debug_assertions))]
const BUILD_PROFILE: &str = "release";

/// Group name for mutually exclusive logging options.
const ARGS_GROUP_LOGGING: &str = "logging";

/// Group name for mutually exclusive party options.
const ARGS_GROUP_PARTY: &str = "party";

/// Default configuration file.
const CONFIG_FILE: &str = "tunehouse.toml";

/// Command line arguments as parsed by `clap`.
#[derive(Clone, Debug, Default, Hash, PartialEq, Eq, PartialOrd, Ord, Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file
    ///
    /// Holds the backend session token, so keep it private.
    #[arg(short, long, value_name = "FILE", value_hint = ValueHint::FilePath, default_value_t = String::from(CONFIG_FILE))]
    config: String,

    /// Username to listen as
    ///
    /// [default: username from the configuration file]
    #[arg(short, long, env = "TUNEHOUSE_USERNAME")]
    username: Option<String>,

    /// Join the party with this id
    #[arg(short, long, value_name = "ID", group = ARGS_GROUP_PARTY)]
    party: Option<String>,

    /// Start a party with your friends
    #[arg(short, long, value_name = "NAME", group = ARGS_GROUP_PARTY)]
    start: Option<String>,

    /// Play previews only
    ///
    /// Switches DJ mode on for a party that you host.
    #[arg(long, default_value_t = false)]
    dj: bool,

    /// Suppresses all output except warnings and errors.
    #[arg(short, long, default_value_t = false, group = ARGS_GROUP_LOGGING)]
    quiet: bool,

    /// Enable verbose logging
    ///
    /// Specify twice for trace logging.
    #[arg(short, long, action = clap::ArgAction::Count, group = ARGS_GROUP_LOGGING)]
    verbose: u8,
}

/// Initializes the logger facade.
///
/// The logging level is determined as follows, in order of precedence from
/// highest to lowest:
/// 1. Command line arguments
/// 2. `RUST_LOG` environment variable
/// 3. Hard coded default
///
/// # Panics
///
/// Panics when a logger facade is already initialized.
fn init_logger(args: &Args) {
    let mut logger = env_logger::Builder::from_env(
        env_logger::Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, "info"),
    );

    if args.quiet || args.verbose > 0 {
        let level = match args.verbose {
            // Quiet and verbose are mutually exclusive.
            0 => LevelFilter::Warn,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        };

        // Filter log messages of external crates.
        logger.filter_module(module_path!(), level);
    }

    logger.init();
}

/// Loads the configuration, falling back to defaults when the default file
/// does not exist.
fn load_config(args: &Args) -> Result<Config, Box<dyn Error>> {
    let mut config = match Config::from_file(&args.config) {
        Ok(config) => config,
        Err(e) if e.is(ErrorKind::NotFound) && args.config == CONFIG_FILE => {
            info!("{CONFIG_FILE} not found, using defaults");
            Config::default()
        }
        Err(e) => {
            if e.is(ErrorKind::NotFound) {
                info!("copy tunehouse.toml.example to {} to get started", args.config);
            }
            return Err(e.into());
        }
    };

    if let Some(username) = &args.username {
        config.username = Some(username.clone());
    }

    Ok(config)
}

/// Keeps the host's session in step with the party until it ends.
///
/// Playback starts once the party has songs. Songs added after the session
/// went idle start it again.
async fn host(config: &Config, services: Services, mut view: PartyView) -> tunehouse::error::Result<()> {
    let mut interval = time::interval(config.poll_interval);
    interval.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

    if view.party().songs.is_empty() {
        info!("waiting for songs in {}", view.party());
    }
    while view.party().songs.is_empty() {
        interval.tick().await;
        match view.refresh().await {
            Ok(_) => {}
            Err(e) if e.is(ErrorKind::NotFound) => {
                info!("{} has ended", view.party().name);
                return Ok(());
            }
            Err(e) => warn!("{e}"),
        }
    }

    let mut session = Session::new(config, Box::new(Headless::new()), services);
    view.play(&mut session).await?;

    let (commands, rx) = mpsc::channel(16);

    let poll = async {
        loop {
            interval.tick().await;
            match view.refresh().await {
                Ok(true) => {
                    info!("{} now has {} songs", view.party(), view.party().songs.len());
                    if commands.send(Command::SetSource(view.source())).await.is_err() {
                        break Ok(());
                    }
                }
                Ok(false) => {}
                Err(e) if e.is(ErrorKind::NotFound) => {
                    info!("{} has ended", view.party().name);
                    break Ok(());
                }
                Err(e) => warn!("{e}"),
            }
        }
    };

    let result = tokio::select! {
        () = session.run(rx) => Ok(()),
        result = poll => result,
    };

    session.stop().await;
    result
}

/// Follows a party as a member until it ends.
async fn follow(config: &Config, mut view: PartyView) -> tunehouse::error::Result<()> {
    info!("joined {}", view.party());

    let mut interval = time::interval(config.poll_interval);
    interval.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

    loop {
        interval.tick().await;
        match view.refresh().await {
            Ok(true) => {
                let songs = &view.party().songs;
                info!("{} now has {} songs", view.party(), songs.len());
                for song in songs {
                    debug!("{song}");
                }
            }
            Ok(false) => {}
            Err(e) if e.is(ErrorKind::NotFound) => {
                info!("{} has ended", view.party().name);
                return Ok(());
            }
            Err(e) => warn!("{e}"),
        }
    }
}

/// Joins or starts a party and listens along.
///
/// A party started here is kept in `started`, so that a restart rejoins it
/// instead of starting another one.
async fn listen(
    args: &Args,
    config: &Config,
    started: &mut Option<PartyId>,
) -> Result<(), Box<dyn Error>> {
    let username = config
        .username
        .clone()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "no username configured"))?;

    let gateway = Arc::new(Gateway::new(config)?);
    let provider = Arc::new(Provider::new(config, gateway.clone())?);
    let services = Services {
        recommender: provider.clone(),
        metadata: provider,
        lyrics: Arc::new(LyricsOvh::new(config)?),
        now_playing: gateway.clone(),
        stats: gateway.clone(),
    };
    let manager = PartyManager::new(gateway.clone(), gateway);

    let party = match (started.clone(), &args.start, &args.party) {
        (Some(id), _, _) => id,
        (None, Some(name), _) => {
            let id = manager.start(&username, name).await?;
            *started = Some(id.clone());
            id
        }
        (None, None, Some(id)) => PartyId::from(id.as_str()),
        (None, None, None) => {
            let parties = manager.parties_for(&username).await?;
            match parties.first() {
                Some(party) => party.id.clone(),
                None => {
                    info!("{username} is not in any party; start one with --start");
                    return Ok(());
                }
            }
        }
    };

    let mut view = manager.open(&party, &username).await?;
    if view.is_host() {
        if args.dj && !view.dj_mode() {
            view.toggle_dj_mode()?;
        }
        info!("hosting {}", view.party());
        host(config, services, view).await?;
    } else {
        follow(config, view).await?;
    }

    Ok(())
}

/// Tells friends that nothing is playing anymore.
async fn clear_listening_to(config: &Config) {
    let Some(username) = &config.username else {
        return;
    };

    match Gateway::new(config) {
        Ok(gateway) => {
            if let Err(e) = gateway.set_listening_to(username, None).await {
                debug!("{e}");
            }
        }
        Err(e) => debug!("{e}"),
    }
}

/// Main application loop.
///
/// Restarts listening when it fails, and re-reads the configuration on
/// `SIGHUP`.
async fn run(args: Args) -> Result<(), Box<dyn Error>> {
    let mut signals = signal::Handler::new()?;
    let mut config = load_config(&args)?;
    let mut started = None;

    // The first run starts immediately.
    let restart_timer = time::sleep(Duration::ZERO);
    tokio::pin!(restart_timer);

    loop {
        tokio::select! {
            // Prioritize signals.
            biased;

            signal = signals.recv() => {
                if signal.is_shutdown() {
                    info!("received {signal}, shutting down gracefully");
                    clear_listening_to(&config).await;
                    break Ok(());
                }

                info!("received {signal}, reloading {}", args.config);
                match load_config(&args) {
                    Ok(reloaded) => config = reloaded,
                    Err(e) => error!("keeping the previous configuration: {e}"),
                }
                restart_timer.as_mut().reset(time::Instant::now());
            }

            result = listen(&args, &config, &mut started), if restart_timer.is_elapsed() => {
                match result {
                    Ok(()) => break Ok(()),
                    Err(e) => error!("{e}"),
                }

                // Sleep with jitter so that restarting clients do not hit
                // the backend at the same time.
                let duration = Duration::from_millis(fastrand::u64(5_000..6_000));
                info!("restarting in {:.1}s", duration.as_secs_f32());
                restart_timer.as_mut().reset(time::Instant::now() + duration);
            }

            () = &mut restart_timer, if !restart_timer.is_elapsed() => {}
        }
    }
}

/// Main entry point of the application.
#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_logger(&args);

    // Dump command line arguments before we do anything more.
    debug!("Command {args:#?}");

    let cmd = command!();
    let name = cmd.get_name().to_string();
    let version = cmd.get_version().unwrap_or("UNKNOWN").to_string();
    info!("starting {name}/{version}; {BUILD_PROFILE}");

    if let Err(e) = run(args).await {
        error!("{e}");
        process::exit(1);
    }
}
