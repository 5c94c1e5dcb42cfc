use liveview_core::Quality;
use liveview_player::Command;
use tracing::info;

/// Arrow-key step in the page.
pub const VOLUME_STEP: f32 = 0.1;

#[derive(Debug, Clone, PartialEq)]
pub enum Control {
    Command(Command),
    Status,
    Help,
    Quit,
}

/// Parse one stdin line. `None` for anything unrecognised.
pub fn parse(line: &str) -> Option<Control> {
    let mut words = line.split_whitespace();
    let verb = words.next()?.to_ascii_lowercase();
    let arg = words.next();

    let command = match verb.as_str() {
        "q" | "quit" | "exit" => return Some(Control::Quit),
        "h" | "help" | "?" => return Some(Control::Help),
        "s" | "status" => return Some(Control::Status),
        "r" | "reconnect" => Command::Reconnect,
        "p" | "play" | "pause" => Command::TogglePlayPause,
        "m" | "mute" => Command::ToggleMute,
        "+" => Command::VolumeStep(VOLUME_STEP),
        "-" => Command::VolumeStep(-VOLUME_STEP),
        "v" | "volume" => Command::SetVolume(arg?.parse().ok()?),
        "auto" => match arg?.to_ascii_lowercase().as_str() {
            "on" => Command::SetAutoQuality(true),
            "off" => Command::SetAutoQuality(false),
            _ => return None,
        },
        "quality" => Command::ChangeQuality(arg?.parse::<Quality>().ok()?),
        "hide" => Command::PauseStats,
        "show" => Command::ResumeStats,
        _ => return None,
    };
    Some(Control::Command(command))
}

pub fn print_help() {
    info!("Commands: r reconnect | p play/pause | m mute | +/- volume | v <0..1> volume");
    info!("          auto on|off | quality auto|high|medium|low | hide/show stats | s status | q quit");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_single_letter_commands() {
        assert_eq!(parse("r"), Some(Control::Command(Command::Reconnect)));
        assert_eq!(parse(" P "), Some(Control::Command(Command::TogglePlayPause)));
        assert_eq!(parse("m"), Some(Control::Command(Command::ToggleMute)));
        assert_eq!(parse("q"), Some(Control::Quit));
        assert_eq!(parse("s"), Some(Control::Status));
    }

    #[test]
    fn parses_volume() {
        assert_eq!(parse("+"), Some(Control::Command(Command::VolumeStep(0.1))));
        assert_eq!(parse("-"), Some(Control::Command(Command::VolumeStep(-0.1))));
        assert_eq!(parse("v 0.25"), Some(Control::Command(Command::SetVolume(0.25))));
        assert_eq!(parse("v loud"), None);
        assert_eq!(parse("volume"), None);
    }

    #[test]
    fn parses_quality() {
        assert_eq!(parse("auto off"), Some(Control::Command(Command::SetAutoQuality(false))));
        assert_eq!(parse("quality HIGH"), Some(Control::Command(Command::ChangeQuality(Quality::High))));
        assert_eq!(parse("quality 4k"), None);
    }

    #[test]
    fn rejects_unknown_and_blank() {
        assert_eq!(parse(""), None);
        assert_eq!(parse("fullscreen"), None);
    }
}
