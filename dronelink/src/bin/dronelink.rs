//! Command-line front end for a flight session.
//!
//! # Usage
//!
//! ```sh
//! dronelink hover --peer udp://192.168.43.42:2390 --duration-secs 10
//! dronelink manual
//! dronelink listen --bind 0.0.0.0:2399
//! ```
//!
//! Manual mode reads keys from stdin, one line at a time (`w`/`s` thrust,
//! `a`/`d` roll, `z`/`c` yaw). A line containing `q`, or end of input,
//! ends every mode. Link degraded and recovered notices go to stderr as they
//! happen.

use std::io::{self, BufRead};
use std::num::ParseIntError;
use std::time::Duration;

use dronelink::net::{Endpoint, EndpointParseError, Role};
use dronelink::runtime::{
    AlwaysReady, HealthEvent, InputError, KeyInput, Mode, PEER_ENV, Session, SessionConfig,
    SessionError, UnknownMode, peer_from_env,
};
use flume::{Receiver, RecvTimeoutError};

/// How often the main thread checks the controller while stdin is idle.
const WAIT_POLL: Duration = Duration::from_millis(50);

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Args(#[from] ArgsError),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("reading stdin: {0}")]
    Stdin(#[from] io::Error),
}

#[derive(Debug, thiserror::Error)]
enum ArgsError {
    #[error("missing mode (manual, hover or listen)")]
    MissingMode,
    #[error(transparent)]
    Mode(#[from] UnknownMode),
    #[error("missing value for {0}")]
    MissingValue(String),
    #[error("invalid address for {flag}: {source}")]
    Address {
        flag: String,
        #[source]
        source: EndpointParseError,
    },
    #[error("invalid number for {flag}: {source}")]
    Number {
        flag: String,
        #[source]
        source: ParseIntError,
    },
    #[error("invalid DRONELINK_PEER: {0}")]
    Env(#[source] EndpointParseError),
    #[error("unknown argument: {0}")]
    Unknown(String),
}

struct Args {
    config: SessionConfig,
    duration: Option<Duration>,
}

/// Why the main loop handed control back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Exit {
    /// `q`, end of input or the duration elapsing.
    Operator,
    /// The controller thread stopped by itself.
    Controller,
}

fn main() {
    dronelink::init_tracing();
    if let Err(e) = run() {
        eprintln!("dronelink: {e}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), CliError> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let Args { config, duration } = parse_args(&args)?;

    eprintln!("dronelink: {} mode, {}", config.mode, describe(&config.role));
    let mut session = Session::spawn(config, &AlwaysReady)?;
    let stats = session.stats();
    let lines = stdin_lines();

    let exit = match session.take_input() {
        Some(input) => {
            eprintln!("dronelink: keys w/s thrust, a/d roll, z/c yaw, q quits");
            let exit = forward_keys(&session, &input, &lines)?;
            drop(input);
            exit
        }
        None => wait(&session, &lines, duration)?,
    };

    match exit {
        Exit::Controller => {
            eprintln!("dronelink: controller stopped");
            session.join()?;
        }
        Exit::Operator => session.shutdown()?,
    }

    eprintln!("dronelink: stopped ({})", stats.snapshot());
    Ok(())
}

/// Reads stdin on its own thread. The channel closes at end of input.
fn stdin_lines() -> Receiver<io::Result<String>> {
    let (tx, rx) = flume::unbounded();
    let spawned = std::thread::Builder::new()
        .name("dronelink-stdin".into())
        .spawn(move || {
            for line in io::stdin().lock().lines() {
                let failed = line.is_err();
                if tx.send(line).is_err() || failed {
                    break;
                }
            }
        });
    if let Err(e) = spawned {
        eprintln!("dronelink: stdin reader unavailable: {e}");
    }
    rx
}

/// Feeds stdin keys to the manual controller until `q`, end of input, or the
/// controller stopping.
fn forward_keys(
    session: &Session,
    input: &KeyInput,
    lines: &Receiver<io::Result<String>>,
) -> Result<Exit, CliError> {
    let health = session.health_events();
    loop {
        report_health(&health);
        if session.is_finished() {
            return Ok(Exit::Controller);
        }
        let line = match lines.recv_timeout(WAIT_POLL) {
            Ok(line) => line?,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => return Ok(Exit::Operator),
        };
        for c in line.chars() {
            if c == 'q' {
                return Ok(Exit::Operator);
            }
            match input.press(c) {
                Ok(true) => {}
                Ok(false) if c.is_whitespace() => {}
                Ok(false) => eprintln!("dronelink: '{c}' is not bound"),
                Err(InputError::Full) => eprintln!("dronelink: input queue full, '{c}' dropped"),
                Err(InputError::Closed) => return Ok(Exit::Controller),
            }
        }
    }
}

/// Blocks until a `q` line, end of input, the duration elapsing, or the
/// controller exiting.
fn wait(
    session: &Session,
    lines: &Receiver<io::Result<String>>,
    duration: Option<Duration>,
) -> Result<Exit, CliError> {
    let started = minstant::Instant::now();
    let health = session.health_events();
    loop {
        report_health(&health);
        if session.is_finished() {
            return Ok(Exit::Controller);
        }
        if duration.is_some_and(|d| started.elapsed() >= d) {
            return Ok(Exit::Operator);
        }
        match lines.recv_timeout(WAIT_POLL) {
            Ok(line) => {
                if line?.trim() == "q" {
                    return Ok(Exit::Operator);
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => return Ok(Exit::Operator),
        }
    }
}

fn report_health(events: &Receiver<HealthEvent>) {
    for event in events.try_iter() {
        eprintln!("dronelink: {}", health_notice(event));
    }
}

fn health_notice(event: HealthEvent) -> String {
    match event {
        HealthEvent::Degraded { consecutive } => {
            format!("link degraded, {consecutive} sends failed in a row")
        }
        HealthEvent::Recovered { after } => {
            format!("link recovered after {after} failed sends")
        }
    }
}

fn describe(role: &Role) -> String {
    match role {
        Role::Sender { peer } => format!("sending to {peer}"),
        Role::Receiver { local } => format!("listening on {local}"),
        Role::Duplex { local, peer } => format!("{local} <-> {peer}"),
    }
}

fn parse_args(args: &[String]) -> Result<Args, ArgsError> {
    let mut iter = args.iter();
    let mode: Mode = match iter.next().map(String::as_str) {
        Some("--help" | "-h") => {
            print_usage();
            std::process::exit(0);
        }
        Some(mode) => mode.parse()?,
        None => return Err(ArgsError::MissingMode),
    };

    let mut config = SessionConfig::new(mode);
    let mut peer = peer_from_env().map_err(ArgsError::Env)?;
    let mut bind: Option<Endpoint> = None;
    let mut duration = None;

    while let Some(flag) = iter.next() {
        let flag = flag.as_str();
        let mut value = || {
            iter.next()
                .map(String::as_str)
                .ok_or_else(|| ArgsError::MissingValue(flag.to_owned()))
        };
        match flag {
            "--peer" | "-p" => peer = Some(parse_addr(flag, value()?)?),
            "--bind" | "-b" => bind = Some(parse_addr(flag, value()?)?),
            "--period-ms" => config.period = Duration::from_millis(parse_num(flag, value()?)?),
            "--ack-timeout-ms" => {
                config.ack_timeout = Duration::from_millis(parse_num(flag, value()?)?);
            }
            "--threshold" => config.degraded_threshold = parse_num(flag, value()?)?,
            "--duration-secs" => {
                duration = Some(Duration::from_secs(parse_num(flag, value()?)?));
            }
            "--no-cutoff" => config.cutoff_on_stop = false,
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            other => return Err(ArgsError::Unknown(other.to_owned())),
        }
    }

    config.role = match (config.role, bind, peer) {
        (Role::Receiver { local }, bind, _) => Role::Receiver {
            local: bind.unwrap_or(local),
        },
        (Role::Duplex { local, peer: default }, bind, peer) => Role::Duplex {
            local: bind.unwrap_or(local),
            peer: peer.unwrap_or(default),
        },
        (Role::Sender { peer: default }, _, peer) => Role::Sender {
            peer: peer.unwrap_or(default),
        },
    };

    Ok(Args { config, duration })
}

fn parse_addr(flag: &str, value: &str) -> Result<Endpoint, ArgsError> {
    value.parse().map_err(|source| ArgsError::Address {
        flag: flag.to_owned(),
        source,
    })
}

fn parse_num<N: std::str::FromStr<Err = ParseIntError>>(
    flag: &str,
    value: &str,
) -> Result<N, ArgsError> {
    value.parse().map_err(|source| ArgsError::Number {
        flag: flag.to_owned(),
        source,
    })
}

fn print_usage() {
    eprintln!(
        r#"dronelink - CRTP command link over UDP

USAGE:
    dronelink <MODE> [OPTIONS]

MODES:
    manual                  Fly from the keyboard (stdin lines)
    hover                   Send the hover setpoint every period
    listen                  Log datagrams arriving on the bind address

OPTIONS:
    -p, --peer <ADDR>       Flight controller (default: 192.168.43.42:2390, env {PEER_ENV})
    -b, --bind <ADDR>       Local address (default: 0.0.0.0:2399)
        --period-ms <N>     Send / keepalive / receive period (default: 100)
        --ack-timeout-ms <N>
                            Reply wait after each send (default: 20)
        --threshold <N>     Consecutive send failures before degraded (default: 10)
        --duration-secs <N> Stop hover or listen after N seconds
        --no-cutoff         Do not send a motor cutoff on stop
    -h, --help              Print this help message

KEYS (manual):
    w/s thrust +/-, a/d roll -/+, z/c yaw -/+, q quit
"#
    );
}

#[cfg(test)]
mod tests {
    use std::net::UdpSocket;
    use std::sync::atomic::Ordering;

    use super::*;

    fn spawn_session(mode: Mode) -> (Session, UdpSocket) {
        let drone = UdpSocket::bind("127.0.0.1:0").unwrap();
        let peer = Endpoint::from(drone.local_addr().unwrap());
        let config = SessionConfig {
            role: Role::Duplex {
                local: Endpoint::localhost(0),
                peer,
            },
            period: Duration::from_millis(20),
            ack_timeout: Duration::from_millis(5),
            ..SessionConfig::new(mode)
        };
        (Session::spawn(config, &AlwaysReady).unwrap(), drone)
    }

    #[test]
    fn idle_stdin_still_notices_stopped_controller() {
        let (mut session, _drone) = spawn_session(Mode::Manual);
        let input = session.take_input().unwrap();
        let (_typing, lines) = flume::unbounded();

        session.shutdown_flag().store(true, Ordering::Relaxed);
        let start = minstant::Instant::now();
        let exit = forward_keys(&session, &input, &lines).unwrap();

        assert_eq!(exit, Exit::Controller);
        assert!(start.elapsed() < Duration::from_secs(2));
        drop(input);
        session.join().unwrap();
    }

    #[test]
    fn keys_flow_until_q() {
        let (mut session, drone) = spawn_session(Mode::Manual);
        drone
            .set_read_timeout(Some(Duration::from_millis(500)))
            .unwrap();
        let input = session.take_input().unwrap();
        let (typing, lines) = flume::unbounded();
        typing.send(Ok("w x".to_owned())).unwrap();
        typing.send(Ok("q".to_owned())).unwrap();

        assert_eq!(forward_keys(&session, &input, &lines).unwrap(), Exit::Operator);
        // closing the input drains queued keys before the controller stops
        drop(input);
        session.join().unwrap();

        let mut buf = [0u8; 16];
        let mut thrusts = Vec::new();
        while let Ok(n) = drone.recv(&mut buf) {
            assert_eq!(n, 5);
            thrusts.push(buf[4]);
        }
        assert!(thrusts.contains(&10), "{thrusts:?}");
    }

    #[test]
    fn wait_ends_on_q_or_closed_stdin() {
        let (session, _drone) = spawn_session(Mode::Hover);
        let (typing, lines) = flume::unbounded();
        typing.send(Ok("hello".to_owned())).unwrap();
        typing.send(Ok(" q ".to_owned())).unwrap();
        assert_eq!(wait(&session, &lines, None).unwrap(), Exit::Operator);

        drop(typing);
        assert_eq!(wait(&session, &lines, None).unwrap(), Exit::Operator);
        assert!(!session.is_finished());
        session.shutdown().unwrap();
    }

    #[test]
    fn wait_honours_duration() {
        let (session, _drone) = spawn_session(Mode::Hover);
        let (_typing, lines) = flume::unbounded();
        let exit = wait(&session, &lines, Some(Duration::from_millis(60))).unwrap();
        assert_eq!(exit, Exit::Operator);
        session.shutdown().unwrap();
    }

    #[test]
    fn health_notices() {
        assert_eq!(
            health_notice(HealthEvent::Degraded { consecutive: 10 }),
            "link degraded, 10 sends failed in a row"
        );
        assert_eq!(
            health_notice(HealthEvent::Recovered { after: 12 }),
            "link recovered after 12 failed sends"
        );
    }
}
