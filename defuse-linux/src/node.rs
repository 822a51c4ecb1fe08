//! The node task: owns one state machine, feeds it received datagrams and console commands,
//! and ticks it on a fixed interval.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use defuse_core::{
    Clock, Coordinator, CoordinatorEvent, MacAddress, MonotonicClock, Peripheral,
    PeripheralEvent, Transport,
};
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::config::{Config, Role};
use crate::console::{Command, COORDINATOR_HELP, MODULE_HELP};
use crate::transport::{self, Routes, UdpTransport};

const TICK: Duration = Duration::from_millis(10);
const REPORT: Duration = Duration::from_secs(1);
const INBOUND_QUEUE: usize = 256;

type Inbound = mpsc::Receiver<(MacAddress, Vec<u8>)>;

/// Bind the socket, start the receive task and run the role's loop until `shutdown` resolves.
pub async fn run(
    cfg: Config,
    mac: MacAddress,
    shutdown: impl Future<Output = anyhow::Result<()>>,
) -> anyhow::Result<()> {
    let socket = Arc::new(transport::bind_multicast(cfg.port, cfg.multicast_group).await?);
    let routes = Routes::default();
    let (tx, rx) = mpsc::channel(INBOUND_QUEUE);
    let recv = tokio::spawn(transport::recv_loop(
        socket.clone(),
        mac,
        routes.clone(),
        tx,
    ));
    let udp = UdpTransport::new(socket, mac, cfg.multicast_group, cfg.port, routes);
    let stdin = BufReader::new(tokio::io::stdin()).lines();
    info!(%mac, role = ?cfg.role, port = cfg.port, "node up");

    let result = match cfg.role {
        Role::Coordinator => {
            let node = Coordinator::new(mac, cfg.coordinator, udp, MonotonicClock::new());
            coordinator_loop(node, rx, stdin, shutdown).await
        }
        role => {
            let node = Peripheral::new(
                role.module_kind(),
                cfg.peripheral,
                udp,
                MonotonicClock::new(),
            );
            module_loop(node, rx, stdin, shutdown).await
        }
    };
    recv.abort();
    result
}

type CoordinatorNode = Coordinator<UdpTransport, MonotonicClock>;
type ModuleNode = Peripheral<UdpTransport, MonotonicClock>;

async fn coordinator_loop(
    mut node: CoordinatorNode,
    mut rx: Inbound,
    mut stdin: Lines<BufReader<Stdin>>,
    shutdown: impl Future<Output = anyhow::Result<()>>,
) -> anyhow::Result<()> {
    tokio::pin!(shutdown);
    let mut tick = tokio::time::interval(TICK);
    let mut report = tokio::time::interval(REPORT);
    let mut stdin_open = true;
    println!("{COORDINATOR_HELP}");
    loop {
        tokio::select! {
            res = &mut shutdown => return res,
            Some((source, bytes)) = rx.recv() => node.on_datagram(source, &bytes),
            line = stdin.next_line(), if stdin_open => match line? {
                Some(line) => coordinator_command(&mut node, &line),
                None => stdin_open = false,
            },
            _ = tick.tick() => {
                for event in node.tick() {
                    log_coordinator_event(&node, event);
                }
            }
            _ = report.tick() => {
                if node.started() && !node.solved() && !node.failed() {
                    info!(time = %node.time_str(true), strikes = node.strikes(), "running");
                } else if node.on_start_countdown() {
                    info!(starts_in = %node.time_to_start_str(), modules = node.registry().len(), "countdown");
                }
            }
        }
    }
}

fn coordinator_command<T: Transport, C: Clock>(node: &mut Coordinator<T, C>, line: &str) {
    let cmd = match Command::parse(line) {
        Ok(Some(cmd)) if cmd.for_coordinator() => cmd,
        Ok(Some(cmd)) => {
            println!("{cmd:?} is a module command; {COORDINATOR_HELP}");
            return;
        }
        Ok(None) => return,
        Err(e) => {
            println!("{e}");
            return;
        }
    };
    match cmd {
        Command::Start(lead) => node.start_after(lead),
        Command::Reset => node.reset(),
        Command::SetStrikes(n) => node.set_max_strikes(n),
        Command::SetDuration(d) => node.set_duration(d),
        Command::Status => {
            println!(
                "phase {:?}, time {}, strikes {}/{}, code {:04}",
                node.phase(),
                node.time_str(true),
                node.strikes(),
                node.max_strikes(),
                node.code()
            );
            for peer in node.registry().iter() {
                println!(
                    "  {} {:?} started={} solved={}",
                    peer.address, peer.kind, peer.started, peer.solved
                );
            }
        }
        Command::Help => println!("{COORDINATOR_HELP}"),
        Command::Solve | Command::Strike | Command::Fail | Command::Info => {}
    }
}

fn log_coordinator_event(node: &CoordinatorNode, event: CoordinatorEvent) {
    match event {
        CoordinatorEvent::Started => {
            info!(modules = node.registry().len(), code = node.code(), "bomb armed")
        }
        CoordinatorEvent::Strike(n) => warn!(strikes = n, max = node.max_strikes(), "strike"),
        CoordinatorEvent::Solved => info!(time = %node.time_str(true), "bomb defused"),
        CoordinatorEvent::Failed => warn!("bomb exploded"),
    }
}

async fn module_loop(
    mut node: ModuleNode,
    mut rx: Inbound,
    mut stdin: Lines<BufReader<Stdin>>,
    shutdown: impl Future<Output = anyhow::Result<()>>,
) -> anyhow::Result<()> {
    tokio::pin!(shutdown);
    let mut tick = tokio::time::interval(TICK);
    let mut stdin_open = true;
    println!("{MODULE_HELP}");
    loop {
        tokio::select! {
            res = &mut shutdown => return res,
            Some((source, bytes)) = rx.recv() => node.on_datagram(source, &bytes),
            line = stdin.next_line(), if stdin_open => match line? {
                Some(line) => module_command(&mut node, &line),
                None => stdin_open = false,
            },
            _ = tick.tick() => {
                for event in node.tick() {
                    match event {
                        PeripheralEvent::Connected => info!(coordinator = ?node.coordinator(), "connected"),
                        PeripheralEvent::Start => info!("game started"),
                        PeripheralEvent::Restart => info!("game reset"),
                        PeripheralEvent::ManualCode(code) => info!(code = %format!("{code:04}"), "code"),
                    }
                }
            }
        }
    }
}

fn module_command<T: Transport, C: Clock>(node: &mut Peripheral<T, C>, line: &str) {
    let cmd = match Command::parse(line) {
        Ok(Some(cmd)) if cmd.for_module() => cmd,
        Ok(Some(cmd)) => {
            println!("{cmd:?} is a coordinator command; {MODULE_HELP}");
            return;
        }
        Ok(None) => return,
        Err(e) => {
            println!("{e}");
            return;
        }
    };
    match cmd {
        Command::Solve => {
            node.solve();
        }
        Command::Strike => {
            node.strike();
        }
        Command::Fail => {
            node.fail();
        }
        Command::Info => {
            node.with_bomb_info(|info| {
                println!(
                    "time {}, strikes {}/{}, puzzles {}/{}, needy {}, solved={} failed={}",
                    info.time_str(),
                    info.strikes,
                    info.max_strikes,
                    info.solved_puzzle_modules,
                    info.total_puzzle_modules,
                    info.total_needy_modules,
                    info.solved,
                    info.failed
                );
            });
        }
        Command::Status => {
            let code = node
                .code()
                .map_or_else(|| "unknown".to_string(), |c| format!("{c:04}"));
            println!(
                "{:?} module, {:?}, code {code}, {} attempts pending",
                node.kind(),
                node.status(),
                node.pending_solve_attempts()
            );
        }
        Command::Help => println!("{MODULE_HELP}"),
        Command::Start(_) | Command::Reset | Command::SetStrikes(_) | Command::SetDuration(_) => {}
    }
}
