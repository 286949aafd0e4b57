//! System2 CLI - drives the task engine from a terminal
//!
//! Acts as a minimal host: issues one request, then ticks the dispatcher
//! like a frame loop until the completion callback fires.

use std::cell::Cell;
use std::path::PathBuf;
use std::process::ExitCode;
use std::rc::Rc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use system2_core::{
    calculate_progress, format_bytes, settings, CallbackRegistry, Delivery, FtpEndpoint, System2,
    UserToken,
};

const TICK: Duration = Duration::from_millis(16);

#[derive(Parser)]
#[command(name = "system2", version, about = "Run commands and transfers through the System2 engine")]
struct Cli {
    /// Settings file (defaults to the user config directory)
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    /// Opaque value echoed back with the result
    #[arg(long, global = true, default_value_t = 0)]
    token: i64,

    /// Print transfer progress
    #[arg(long, short, global = true)]
    progress: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a shell command and print its output
    Run { command: String },
    /// Download a URL over HTTP
    Download { url: String, output: PathBuf },
    /// Download a file from an FTP server
    FtpGet {
        remote: String,
        output: PathBuf,
        #[command(flatten)]
        server: FtpArgs,
    },
    /// Upload a file to an FTP server
    Upload {
        file: PathBuf,
        remote: String,
        #[command(flatten)]
        server: FtpArgs,
    },
    /// Copy a local file
    Copy { source: PathBuf, destination: PathBuf },
    /// Fetch a page and print its body
    Page {
        url: String,
        /// Send this body as a POST
        #[arg(long, default_value = "")]
        post: String,
        #[arg(long, default_value = "")]
        user_agent: String,
    },
}

#[derive(Args)]
struct FtpArgs {
    #[arg(long)]
    host: String,
    #[arg(long, default_value_t = 21)]
    port: u16,
    #[arg(long, default_value = "anonymous")]
    user: String,
    #[arg(long, default_value = "")]
    password: String,
}

impl From<FtpArgs> for FtpEndpoint {
    fn from(args: FtpArgs) -> Self {
        FtpEndpoint::new(args.host, args.port, args.user, args.password)
    }
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let settings = match &cli.settings {
        Some(path) => match settings::load(path) {
            Ok(s) => s,
            Err(e) => {
                log::error!("Failed to load settings from {:?}: {}", path, e);
                return ExitCode::FAILURE;
            }
        },
        None => settings::load_or_default(),
    };

    let mut system = match System2::start(settings) {
        Ok(system) => system,
        Err(e) => {
            log::error!("Failed to start task engine: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let status = Rc::new(Cell::new(None::<i32>));
    let mut registry = CallbackRegistry::new();
    let done = status.clone();
    let callback = registry.register(move |delivery| {
        if let Delivery::Completed {
            kind,
            result,
            error,
            status,
            token,
            ..
        } = delivery
        {
            if !result.is_empty() {
                print!("{}", result);
            }
            if status == 0 {
                log::info!("{} finished (token {})", kind, token.0);
            } else {
                log::error!("{} failed with status {}: {}", kind, status, error);
            }
            done.set(Some(status));
        }
        Ok(())
    });
    let progress = cli.progress.then(|| {
        registry.register(|delivery| {
            if let Delivery::Progress { counters, .. } = delivery {
                let (now, total) = if counters.upload_total > 0 {
                    (counters.upload_now, counters.upload_total)
                } else {
                    (counters.download_now, counters.download_total)
                };
                eprintln!(
                    "{} / {} ({:.0}%)",
                    format_bytes(now),
                    format_bytes(total),
                    calculate_progress(now, total) * 100.0
                );
            }
            Ok(())
        })
    });

    let token = UserToken(cli.token);
    let submitted = match cli.command {
        Command::Run { command } => system.run_command_with_callback(&command, callback, token),
        Command::Download { url, output } => {
            system.download_file(&url, &output, callback, token, progress)
        }
        Command::FtpGet {
            remote,
            output,
            server,
        } => system.download_ftp_file(&remote, &output, server.into(), callback, token, progress),
        Command::Upload {
            file,
            remote,
            server,
        } => system.upload_file(&file, &remote, server.into(), callback, token, progress),
        Command::Copy {
            source,
            destination,
        } => system.copy_file(&source, &destination, callback, token),
        Command::Page {
            url,
            post,
            user_agent,
        } => system.get_page(&url, &post, &user_agent, callback, token),
    };

    if let Err(e) = submitted {
        log::error!("Request rejected: {}", e);
        system.shutdown();
        return ExitCode::FAILURE;
    }

    while status.get().is_none() {
        system.tick(&mut registry);
        std::thread::sleep(TICK);
    }
    system.shutdown();

    match status.get() {
        Some(0) => ExitCode::SUCCESS,
        Some(code) => ExitCode::from(u8::try_from(code).unwrap_or(1)),
        None => ExitCode::FAILURE,
    }
}
