//! Command line parameters.

use std::path::PathBuf;

use sylvan_core::{Error, Result};
use sylvan_paging::manager::MAX_RADIUS;

#[derive(Debug, Clone)]
pub struct DemoParams {
    pub seed: u32,
    pub radius: i32,
    pub cache_time: Option<f32>,
    pub archive: Option<PathBuf>,
    pub frames: u32,
    pub speed: f32,
    pub teleport_at: Option<u32>,
    pub log_every: u32,
    pub threads: usize,
    pub inline: bool,
}

impl Default for DemoParams {
    fn default() -> Self {
        Self {
            seed: 42,
            radius: 3,
            cache_time: None,
            archive: None,
            frames: 1800,
            speed: 40.0,
            teleport_at: None,
            log_every: 120,
            threads: 0,
            inline: false,
        }
    }
}

impl DemoParams {
    /// Parse parameters from command line arguments.
    pub fn from_args() -> Self {
        Self::parse(std::env::args().skip(1))
    }

    fn parse(args: impl IntoIterator<Item = String>) -> Self {
        let mut params = Self::default();
        let args: Vec<String> = args.into_iter().collect();

        let mut i = 0;
        while i < args.len() {
            let value = args.get(i + 1);
            let mut consumed = true;
            match (args[i].as_str(), value) {
                ("--seed", Some(v)) => set(&mut params.seed, v),
                ("--radius", Some(v)) => set(&mut params.radius, v),
                ("--cache-time", Some(v)) => params.cache_time = v.parse().ok(),
                ("--archive", Some(v)) => params.archive = Some(PathBuf::from(v)),
                ("--frames", Some(v)) => set(&mut params.frames, v),
                ("--speed", Some(v)) => set(&mut params.speed, v),
                ("--teleport-at", Some(v)) => params.teleport_at = v.parse().ok(),
                ("--log-every", Some(v)) => set(&mut params.log_every, v),
                ("--threads", Some(v)) => set(&mut params.threads, v),
                ("--inline", _) => {
                    params.inline = true;
                    consumed = false;
                }
                (other, _) => {
                    tracing::warn!("Ignoring unknown argument {other}");
                    consumed = false;
                }
            }
            i += if consumed { 2 } else { 1 };
        }

        params
    }

    pub fn validate(&self) -> Result<()> {
        if !(0..=MAX_RADIUS).contains(&self.radius) {
            return Err(Error::InvalidConfig(format!(
                "--radius must be in 0..={MAX_RADIUS}, got {}",
                self.radius
            )));
        }
        if self.log_every == 0 {
            return Err(Error::InvalidConfig("--log-every must be at least 1".to_string()));
        }
        if self.speed.is_nan() || self.speed < 0.0 {
            return Err(Error::InvalidConfig(format!(
                "--speed must not be negative, got {}",
                self.speed
            )));
        }
        Ok(())
    }

    pub fn teleport_frame(&self) -> u32 {
        self.teleport_at.unwrap_or(self.frames / 2)
    }
}

/// Overwrite `slot` if `value` parses, otherwise warn and keep the default.
fn set<T: std::str::FromStr>(slot: &mut T, value: &str) {
    match value.parse() {
        Ok(v) => *slot = v,
        Err(_) => tracing::warn!("Ignoring unparsable value {value}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> DemoParams {
        DemoParams::parse(args.iter().map(ToString::to_string))
    }

    #[test]
    fn defaults_without_args() {
        let params = parse(&[]);
        assert_eq!(params.seed, 42);
        assert_eq!(params.teleport_frame(), 900);
        assert!(params.validate().is_ok());
    }

    #[test]
    fn parses_flags() {
        let params = parse(&[
            "--inline",
            "--radius",
            "5",
            "--cache-time",
            "2.5",
            "--archive",
            "pages",
            "--frames",
            "10",
        ]);
        assert!(params.inline);
        assert_eq!(params.radius, 5);
        assert_eq!(params.cache_time, Some(2.5));
        assert_eq!(params.archive, Some(PathBuf::from("pages")));
        assert_eq!(params.frames, 10);
        assert_eq!(params.teleport_frame(), 5);
    }

    #[test]
    fn bad_values_keep_defaults() {
        let params = parse(&["--radius", "wide", "--threads", "2"]);
        assert_eq!(params.radius, 3);
        assert_eq!(params.threads, 2);

        assert!(parse(&["--radius", "99"]).validate().is_err());
    }
}
