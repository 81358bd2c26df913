//! this binary starts the ustore server
//! to see the list of options, type: `ustore-server --help`
//!
//! The server runs until Enter is pressed (or stdin is closed), then answers the requests that
//! are still queued and exits.

use std::io::BufRead;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::exit;
use std::thread;
use std::time::Duration;
use clap::{crate_version, App, Arg, ArgMatches};
use crossbeam::channel;
use ustore::config::{DEFAULT_ADDRESS, DEFAULT_DATA_FILE};
use ustore::{JsonStore, LoadStatus, Result, ServerConfig, UstoreError, UstoreServer};
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;


/// ['Opt'] holds parsed and validated options from the command line
#[derive(Debug)]
struct Opt {
    config: ServerConfig,
}

impl Opt {
    /// validates the command line arguments and builds the server configuration from them,
    /// falling back to the defaults for anything that was not given
    /// # Errors
    /// returns [`UstoreError::Parsing`] if one of the parameters is invalid
    ///
    fn build(matches: &ArgMatches) -> Result<Opt> {
        let addr = matches.value_of("addr").unwrap_or(DEFAULT_ADDRESS);
        let addr: SocketAddr = addr
            .parse()
            .map_err(|_| UstoreError::Parsing(format!("could not parse {} into an IP address and port", &addr)))?;
        let data = matches.value_of("data").unwrap_or(DEFAULT_DATA_FILE);

        let mut config = ServerConfig::default()
            .addr(addr)
            .data_path(PathBuf::from(data));
        if let Some(n) = parse_count(matches, "acceptors")? {
            config = config.acceptors(n);
        }
        if let Some(n) = parse_count(matches, "processors")? {
            config = config.processors(n);
        }
        if let Some(n) = parse_count(matches, "queue-capacity")? {
            config = config.queue_capacity(n);
        }
        if let Some(secs) = parse_count(matches, "recv-timeout")? {
            config = config.recv_timeout(Duration::from_secs(secs as u64));
        }

        Ok(Opt { config })
    }
}

/// parses the value of the argument `name` into a positive integer, if it was given
fn parse_count(matches: &ArgMatches, name: &str) -> Result<Option<usize>> {
    match matches.value_of(name) {
        None => Ok(None),
        Some(value) => match value.parse::<usize>() {
            Ok(n) if n > 0 => Ok(Some(n)),
            _ => Err(UstoreError::Parsing(format!("--{} must be a positive integer, got {}", name, value))),
        },
    }
}

fn main() {
    // set up a tracing subscriber to log to STDERR
    subscriber_config();

    // parse command line args
    let matches = App::new("ustore-server")
        .version(crate_version!())
        .author("strohs <strohs1@gmail.com>")
        .about("a multi-threaded user store served over HTTP")
        .arg(Arg::with_name("addr")
            .long("addr")
            .value_name("IP_ADDR:PORT")
            .help("sets the IP_ADDR:PORT that the server listens on")
            .default_value(DEFAULT_ADDRESS))
        .arg(Arg::with_name("data")
            .long("data")
            .value_name("FILE")
            .help("sets the JSON file the user data is persisted to")
            .default_value(DEFAULT_DATA_FILE))
        .arg(Arg::with_name("acceptors")
            .long("acceptors")
            .value_name("THREADS")
            .help("number of connection acceptor threads, defaults to the number of cores"))
        .arg(Arg::with_name("processors")
            .long("processors")
            .value_name("THREADS")
            .help("number of request processor threads, defaults to half the number of cores"))
        .arg(Arg::with_name("queue-capacity")
            .long("queue-capacity")
            .value_name("REQUESTS")
            .help("maximum number of requests waiting for a processor"))
        .arg(Arg::with_name("recv-timeout")
            .long("recv-timeout")
            .value_name("SECONDS")
            .help("how long to wait for a client to send its request"))
        .get_matches();

    // validate command line options, store them in Opt
    let opt = match Opt::build(&matches) {
        Ok(opt) => opt,
        Err(err) => {
            eprintln!("{}", err);
            exit(1);
        }
    };

    // start the server
    if let Err(e) = run(opt) {
        eprintln!("{}", e);
        exit(1);
    }
}

fn run(opt: Opt) -> Result<()> {
    info!("ustore-server {}", env!("CARGO_PKG_VERSION"));
    info!("Data file: {:?}", opt.config.data_path);

    let store = JsonStore::open(opt.config.data_path.clone())?;
    if store.load_status() == LoadStatus::Recovered {
        warn!("{:?} could not be parsed, serving an empty document. It will be overwritten on the next write", store.path());
    }

    // pressing Enter, or closing stdin, triggers the shutdown
    let (trigger_tx, trigger_rx) = channel::bounded::<()>(1);
    thread::Builder::new()
        .name("stdin-shutdown".into())
        .spawn(move || {
            let mut line = String::new();
            if let Err(e) = std::io::stdin().lock().read_line(&mut line) {
                warn!("could not read stdin: {}", e);
            }
            let _ = trigger_tx.send(());
        })?;

    let handle = UstoreServer::new(store, opt.config).start()?;
    // the bound address, which differs from the configured one when the port was 0
    println!("Server running on {}...", handle.local_addr());
    println!("Press Enter to shutdown...");
    if trigger_rx.recv().is_err() {
        warn!("shutdown trigger disconnected");
    }
    handle.shutdown();
    Ok(())
}

/// configures a tracing subscriber that will log to STDERR
fn subscriber_config() {
    let subscriber = FmtSubscriber::builder()
        // all spans/events with a level higher than DEBUG (e.g, info, warn, etc.)
        // will be written out.
        .with_max_level(Level::DEBUG)
        // log to stderr instead of stdout
        .with_writer(std::io::stderr)
        // completes the builder.
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .expect("setting tracing default subscriber failed");
}
