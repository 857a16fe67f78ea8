//! Boot-time settings, read from the command line the boot stub hands over.
//!
//! The command line is a list of whitespace separated `key=value` tokens:
//!
//! ```text
//! log=debug usermode=off stack=16384
//! ```

use core::str::FromStr;

use log::LevelFilter;

use crate::proc::Stack;

pub const DEFAULT_STACK_SIZE: usize = 8192;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    pub log_level: LevelFilter,
    /// Drop the boot thread into ring 3 once everything is running
    pub user_mode: bool,
    /// Stack size for threads started from boot images, in bytes
    pub stack_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: LevelFilter::Info,
            user_mode: true,
            stack_size: DEFAULT_STACK_SIZE,
        }
    }
}

impl Config {
    /// Parse `cmdline` on top of the defaults. Tokens that cannot be understood are reported and
    /// skipped.
    pub fn from_cmdline(cmdline: &str) -> Self {
        let mut config = Self::default();

        for token in cmdline.split_whitespace() {
            let Some((key, value)) = token.split_once('=') else {
                log::warn!("Ignoring command line token '{}'", token);
                continue;
            };

            let applied = match key {
                "log" => LevelFilter::from_str(value)
                    .map(|level| config.log_level = level)
                    .is_ok(),
                "usermode" => parse_switch(value)
                    .map(|on| config.user_mode = on)
                    .is_some(),
                "stack" => value
                    .parse::<usize>()
                    .map(|size| config.stack_size = size.max(Stack::MIN_SIZE) & !0b11)
                    .is_ok(),
                _ => {
                    log::warn!("Unknown command line option '{}'", key);
                    continue;
                }
            };

            if !applied {
                log::warn!("Bad value '{}' for option '{}'", value, key);
            }
        }

        config
    }
}

fn parse_switch(value: &str) -> Option<bool> {
    match value {
        "on" | "yes" | "1" | "true" => Some(true),
        "off" | "no" | "0" | "false" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_command_line_gives_defaults() {
        assert_eq!(Config::from_cmdline(""), Config::default());
        assert_eq!(Config::from_cmdline("   "), Config::default());
    }

    #[test]
    fn reads_every_option() {
        let config = Config::from_cmdline("log=trace usermode=off stack=16384");

        assert_eq!(config.log_level, LevelFilter::Trace);
        assert!(!config.user_mode);
        assert_eq!(config.stack_size, 16384);
    }

    #[test]
    fn log_level_is_case_insensitive() {
        assert_eq!(Config::from_cmdline("log=WARN").log_level, LevelFilter::Warn);
    }

    #[test]
    fn stack_is_clamped_and_word_aligned() {
        assert_eq!(Config::from_cmdline("stack=10").stack_size, Stack::MIN_SIZE);
        assert_eq!(Config::from_cmdline("stack=4099").stack_size, 4096);
    }

    #[test]
    fn bad_tokens_leave_defaults_alone() {
        let config = Config::from_cmdline("log=loud usermode=maybe stack=big quiet colour=on");
        assert_eq!(config, Config::default());
    }

    #[test]
    fn later_tokens_win() {
        let config = Config::from_cmdline("usermode=off usermode=on");
        assert!(config.user_mode);
    }
}
