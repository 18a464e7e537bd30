use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "biocheck",
    version,
    about = "Run a facial identity validation and print the result as JSON"
)]
pub struct Cli {
    #[arg(long, help = "Start request JSON file, or - to read it from stdin")]
    pub request: PathBuf,
    #[arg(long, help = "Settings file (default: user config, then /etc/biocheck)")]
    pub config: Option<PathBuf>,
    #[arg(long, help = "Serve this JPEG as the camera instead of a video device")]
    pub image: Option<PathBuf>,
    #[arg(long, help = "Video device index to use instead of auto-detection")]
    pub device: Option<i32>,
    #[arg(
        long,
        help = "Capture as soon as the camera is ready, then confirm or give up without prompting"
    )]
    pub auto: bool,
    #[arg(long, help = "Send log records to syslog instead of stderr")]
    pub syslog: bool,
}

impl Cli {
    pub fn request_from_stdin(&self) -> bool {
        self.request.as_os_str() == "-"
    }

    /// Stdin carries the request, so nobody is left to type actions.
    pub fn unattended(&self) -> bool {
        self.auto || self.request_from_stdin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stdin_request_forces_unattended_mode() {
        let cli = Cli::parse_from(["biocheck", "--request", "-"]);
        assert!(cli.request_from_stdin());
        assert!(cli.unattended());

        let cli = Cli::parse_from(["biocheck", "--request", "req.json", "--image", "face.jpg"]);
        assert!(!cli.unattended());
        assert_eq!(cli.image.as_deref(), Some(std::path::Path::new("face.jpg")));
    }
}
