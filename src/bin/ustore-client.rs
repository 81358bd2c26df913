//! The ustore-client executable supports the following command line arguments:
//!
//! `ustore-client users [--addr IP-PORT] [--token TOKEN]`
//!
//!     List the registered users. Requires a token.
//!
//! `ustore-client add-user <NAME> <EMAIL> [--addr IP-PORT] [--token TOKEN]`
//!
//!     Add a user record. Requires a token.
//!
//! `ustore-client signup <USERNAME> <PASSWORD> [--addr IP-PORT]`
//!
//!     Register a new account.
//!
//! `ustore-client login <USERNAME> <PASSWORD> [--addr IP-PORT]`
//!
//!     Log in and print the issued token, to be passed to --token afterwards.
//!
//! --addr accepts an IP address, either v4 or v6, and a port number, with the format IP:PORT.
//! If --addr is not specified then connect on 127.0.0.1:8080.
//! Print an error and return a non-zero exit code on server error, or if IP-PORT does not parse
//! as an address.
//!
//! `ustore-client shell [--addr IP-PORT]`
//!
//!     Read commands from stdin, one per line: `users`, `add-user NAME EMAIL`,
//!     `signup USERNAME PASSWORD`, `login USERNAME PASSWORD` and `exit`. The token from a
//!     successful login is kept and sent with every later command of the session.
//!
//! `ustore-client -V`
//!
//!     Print the version.


use std::io::{self, BufRead, Write};
use std::net::SocketAddr;
use clap::{crate_version, App, Arg, SubCommand, ArgMatches};
use ustore::{ClientResponse, Result, UstoreClient, UstoreError};
use tracing::{Level};
use tracing_subscriber::{FmtSubscriber};

const DEFAULT_ADDRESS: &str = "127.0.0.1:8080";

/// The requests that can be sent from the command line
#[derive(Debug)]
enum Command {
    Users,
    AddUser { name: String, email: String },
    Signup { username: String, password: String },
    Login { username: String, password: String },
    Shell,
}

/// ['Opt'] holds parsed and validated options from the command line
#[derive(Debug)]
struct Opt {
    /// the server's ip:port
    addr: SocketAddr,
    token: Option<String>,
    cmd: Command,
}

impl Opt {
    /// validates the `addr` parameter is a valid IP address and PORT
    /// returns `Ok<Opt>` if everything is valid
    /// # Errors
    /// returns [`UstoreError::Parsing`] if one of the parameters is invalid
    ///
    fn build(addr: &str, token: Option<String>, cmd: Command) -> Result<Opt> {
        let addr: SocketAddr = addr
            .parse()
            .map_err(|_| UstoreError::Parsing(format!("could not parse {} into an IP address and port", &addr)))?;

        Ok(Opt { addr, token, cmd })
    }
}

fn main() {
    // configure a subscriber that will log messages to STDERR
    subscriber_config();

    let matches = App::new("ustore-client")
        .version(crate_version!())
        .author("strohs <strohs1@gmail.com>")
        .about("client for the ustore server")
        .subcommands(vec![
            SubCommand::with_name("users")
                .about("List the registered users"),
            SubCommand::with_name("add-user")
                .about("Add a user record")
                .arg(Arg::with_name("NAME").required(true).index(1))
                .arg(Arg::with_name("EMAIL").required(true).index(2)),
            SubCommand::with_name("signup")
                .about("Register a new account")
                .arg(Arg::with_name("USERNAME").required(true).index(1))
                .arg(Arg::with_name("PASSWORD").required(true).index(2)),
            SubCommand::with_name("login")
                .about("Log in and print the issued token")
                .arg(Arg::with_name("USERNAME").required(true).index(1))
                .arg(Arg::with_name("PASSWORD").required(true).index(2)),
            SubCommand::with_name("shell")
                .about("Run commands read from stdin, keeping the login token between them"),
        ])
        .arg(Arg::with_name("addr")
            .long("addr")
            .value_name("IP_ADDR:PORT")
            .help("sets the IP_ADDR:PORT of the server to connect to")
            .global(true)
            .default_value(DEFAULT_ADDRESS))
        .arg(Arg::with_name("token")
            .long("token")
            .value_name("TOKEN")
            .help("the bearer token returned by login")
            .global(true))
        .get_matches();

    // parse commands into an Opt struct, then run them
    if let Err(e) = parse_options(&matches).and_then(run) {
        eprintln!("{}", e);
        std::process::exit(1);
    }
}

/// runs the specified command on a [`UstoreClient`]
fn run(opt: Opt) -> Result<()> {
    let mut client = UstoreClient::new(opt.addr);
    if let Some(token) = opt.token {
        client = client.with_token(token);
    }
    match opt.cmd {
        Command::Users => print_response(client.users()?),
        Command::AddUser { name, email } => print_response(client.add_user(&name, &email)?),
        Command::Signup { username, password } => print_response(client.signup(&username, &password)?),
        Command::Login { username, password } => {
            let token = client.login(&username, &password)?;
            println!("{}", token);
            Ok(())
        }
        Command::Shell => shell(client),
    }
}

/// reads commands from stdin until `exit` or end of input. Failed commands are reported and the
/// session goes on
fn shell(mut client: UstoreClient) -> Result<()> {
    let stdin = io::stdin();
    prompt()?;
    for line in stdin.lock().lines() {
        let line = line?;
        let words: Vec<&str> = line.split_whitespace().collect();
        match words.as_slice() {
            [] => {}
            ["exit"] | ["quit"] => break,
            ["users"] => report(client.users()),
            ["add-user", name, email] => {
                if client.token().is_none() {
                    eprintln!("you need to login first");
                } else {
                    report(client.add_user(name, email));
                }
            }
            ["signup", username, password] => report(client.signup(username, password)),
            ["login", username, password] => match client.login(username, password) {
                Ok(_) => println!("Logged in successfully!"),
                Err(e) => eprintln!("login failed: {}", e),
            },
            _ => eprintln!("unknown command: {}", line.trim()),
        }
        prompt()?;
    }
    Ok(())
}

fn prompt() -> Result<()> {
    print!("> ");
    io::stdout().flush()?;
    Ok(())
}

// prints the outcome of a single shell command
fn report(result: Result<ClientResponse>) {
    if let Err(e) = result.and_then(print_response) {
        eprintln!("{}", e);
    }
}

/// prints the body of a response, treating any non 2xx status as an error
fn print_response(resp: ClientResponse) -> Result<()> {
    if resp.is_success() {
        println!("{}", resp.body);
        Ok(())
    } else {
        Err(UstoreError::StringErr(format!("{}: {}", resp.status, resp.body)))
    }
}

/// parses the matches from the command line into an [`Opt`] struct
fn parse_options(matches: &ArgMatches) -> Result<Opt> {
    let sub = matches.subcommand().1;
    let addr = global_value(matches, sub, "addr").unwrap_or(DEFAULT_ADDRESS);
    let token = global_value(matches, sub, "token").map(String::from);
    let arg = |args: &ArgMatches, name: &str| args.value_of(name).map(String::from).unwrap_or_default();
    let cmd = match matches.subcommand() {
        ("users", Some(_)) => Command::Users,
        ("add-user", Some(args)) => Command::AddUser {
            name: arg(args, "NAME"),
            email: arg(args, "EMAIL"),
        },
        ("signup", Some(args)) => Command::Signup {
            username: arg(args, "USERNAME"),
            password: arg(args, "PASSWORD"),
        },
        ("login", Some(args)) => Command::Login {
            username: arg(args, "USERNAME"),
            password: arg(args, "PASSWORD"),
        },
        ("shell", Some(_)) => Command::Shell,
        _ => return Err(UstoreError::Parsing("no command given, see --help".to_string())),
    };
    Opt::build(addr, token, cmd)
}

/// gets a global option, which may have been given before or after the subcommand
fn global_value<'m>(matches: &'m ArgMatches<'_>, sub: Option<&'m ArgMatches<'_>>, name: &str) -> Option<&'m str> {
    sub.filter(|args| args.occurrences_of(name) > 0)
        .and_then(|args| args.value_of(name))
        .or_else(|| matches.value_of(name))
}

/// configures a tracing subscriber that will log to STDERR
fn subscriber_config() {
    let subscriber = FmtSubscriber::builder()
        // only warnings and errors, stdout is kept for the server's responses
        .with_max_level(Level::WARN)
        // log to stderr instead of stdout
        .with_writer(std::io::stderr)
        // completes the builder.
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .expect("setting tracing default subscriber failed");
}
