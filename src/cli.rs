//! Command-line argument parsing for dailycast

/// Parsed command line arguments
#[derive(Debug, Default)]
pub struct Args {
    pub validate: bool,
    pub help: bool,
    /// Run one on-demand delivery for this chat id and exit
    pub deliver: Option<i64>,
}

pub fn parse_args() -> Args {
    let args: Vec<String> = std::env::args().collect();
    parse_from(&args)
}

pub fn parse_from(args: &[String]) -> Args {
    let mut result = Args::default();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--validate" => result.validate = true,
            "--help" | "-h" => result.help = true,
            "--deliver" => {
                if i + 1 < args.len() {
                    i += 1;
                    result.deliver = args[i].parse().ok();
                }
            }
            _ => {}
        }
        i += 1;
    }

    result
}

pub fn print_help() {
    println!("dailycast - daily weather and prediction deliveries\n");
    println!("USAGE:");
    println!("    dailycast [OPTIONS]\n");
    println!("OPTIONS:");
    println!("    --validate            Validate configuration and exit");
    println!("    --deliver CHAT_ID     Run one delivery for a subscriber and exit");
    println!("    --help, -h            Show this help message\n");
    println!("ENVIRONMENT:");
    println!("    TELEGRAM_TOKEN, OPENWEATHER_TOKEN (required)");
    println!("    DELIVERY_HOUR, WEATHER_TIMEOUT_SECS, POLL_INTERVAL_SECS, UNITS, LANG_CODE");
}
