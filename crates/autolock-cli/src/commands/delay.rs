use std::path::PathBuf;

use autolock_core::{delay_for, is_night_time, parse_time_string};
use clap::Args;
use serde_json::json;

use super::{find_door, load_config};

#[derive(Args)]
pub struct DelayArgs {
    /// Door id
    #[arg(long)]
    door: String,
    /// Time of day (HH:MM)
    #[arg(long)]
    at: String,
    /// Config file (defaults to $AUTOLOCK_CONFIG or ~/.config/autolock/config.toml)
    #[arg(long)]
    config: Option<PathBuf>,
    /// Output as JSON
    #[arg(long)]
    json: bool,
}

pub fn run(args: DelayArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(args.config.as_deref())?;
    let door = find_door(&config, &args.door)?;
    let at = parse_time_string(&args.at)?;

    let window = door.window()?;
    let night = window.as_ref().is_some_and(|w| is_night_time(&at, w));
    let minutes = delay_for(&at, &door.delay_policy(), window.as_ref());

    if args.json {
        let out = json!({
            "door": door.id(),
            "at": args.at,
            "minutes": minutes,
            "night": night,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        let period = if night { "night" } else { "day" };
        println!("{}: {minutes} min at {} ({period})", door.id(), args.at);
    }
    Ok(())
}
