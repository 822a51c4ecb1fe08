//! Console commands read from stdin, one per line.

use std::time::Duration;

use anyhow::{bail, Context};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    // Coordinator.
    Start(Duration),
    Reset,
    SetStrikes(u8),
    SetDuration(Duration),
    // Modules.
    Solve,
    Strike,
    Fail,
    Info,
    // Either role.
    Status,
    Help,
}

impl Command {
    /// Parse one line. Blank lines yield `None`.
    pub fn parse(line: &str) -> anyhow::Result<Option<Command>> {
        let mut words = line.split_whitespace();
        let Some(name) = words.next() else {
            return Ok(None);
        };
        let arg = words.next();
        if words.next().is_some() {
            bail!("too many arguments to {name}");
        }
        let cmd = match (name, arg) {
            ("start", Some(secs)) => Command::Start(seconds(secs)?),
            ("start", None) => Command::Start(Duration::ZERO),
            ("reset", None) => Command::Reset,
            ("strikes", Some(n)) => {
                Command::SetStrikes(n.parse().with_context(|| format!("bad strike count {n:?}"))?)
            }
            ("duration", Some(secs)) => Command::SetDuration(seconds(secs)?),
            ("solve", None) => Command::Solve,
            ("strike", None) => Command::Strike,
            ("fail", None) => Command::Fail,
            ("info", None) => Command::Info,
            ("status", None) => Command::Status,
            ("help" | "?", None) => Command::Help,
            (name, _) => bail!("unknown command {name:?} (try help)"),
        };
        Ok(Some(cmd))
    }

    pub fn for_coordinator(self) -> bool {
        matches!(
            self,
            Command::Start(_)
                | Command::Reset
                | Command::SetStrikes(_)
                | Command::SetDuration(_)
                | Command::Status
                | Command::Help
        )
    }

    pub fn for_module(self) -> bool {
        matches!(
            self,
            Command::Solve
                | Command::Strike
                | Command::Fail
                | Command::Info
                | Command::Status
                | Command::Help
        )
    }
}

fn seconds(s: &str) -> anyhow::Result<Duration> {
    let secs: f64 = s.parse().with_context(|| format!("bad seconds {s:?}"))?;
    if !secs.is_finite() || secs < 0.0 {
        bail!("seconds must be a non-negative number, got {s:?}");
    }
    Duration::try_from_secs_f64(secs).with_context(|| format!("{s:?} seconds is out of range"))
}

pub const COORDINATOR_HELP: &str =
    "commands: start [secs] | reset | strikes <n> | duration <secs> | status";
pub const MODULE_HELP: &str = "commands: solve | strike | fail | info | status";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_commands() {
        assert_eq!(
            Command::parse("start 10").unwrap(),
            Some(Command::Start(Duration::from_secs(10)))
        );
        assert_eq!(
            Command::parse("  start  ").unwrap(),
            Some(Command::Start(Duration::ZERO))
        );
        assert_eq!(
            Command::parse("duration 1.5").unwrap(),
            Some(Command::SetDuration(Duration::from_millis(1500)))
        );
        assert_eq!(
            Command::parse("strikes 5").unwrap(),
            Some(Command::SetStrikes(5))
        );
        assert_eq!(Command::parse("solve").unwrap(), Some(Command::Solve));
        assert_eq!(Command::parse("").unwrap(), None);
    }

    #[test]
    fn rejects_bad_input() {
        assert!(Command::parse("explode").is_err());
        assert!(Command::parse("start -1").is_err());
        assert!(Command::parse("start soon").is_err());
        assert!(Command::parse("strikes 300").is_err());
        assert!(Command::parse("solve now").is_err());
        assert!(Command::parse("start 1 2").is_err());
        assert!(Command::parse("start 1e30").is_err());
        assert!(Command::parse("duration 1e30").is_err());
        assert!(Command::parse("duration inf").is_err());
    }

    #[test]
    fn role_filters() {
        assert!(Command::Reset.for_coordinator());
        assert!(!Command::Reset.for_module());
        assert!(Command::Fail.for_module());
        assert!(!Command::Fail.for_coordinator());
        assert!(Command::Status.for_module() && Command::Status.for_coordinator());
    }
}
