use fern::colors::{Color, ColoredLevelConfig};

/// Stdout-only logger. A proxy relaying third-party traffic has no
/// business writing a persistent on-disk log of what it relayed, so no
/// file sink is chained here.
pub fn init(level: log::LevelFilter, colored: bool) -> anyhow::Result<()> {
    let colors = ColoredLevelConfig::new()
        .trace(Color::Magenta)
        .debug(Color::Blue)
        .info(Color::Green)
        .warn(Color::Yellow)
        .error(Color::Red);

    fern::Dispatch::new()
        .format(move |out, message, record| {
            out.finish(format_args!(
                "[{} {} {}] {}",
                chrono::Utc::now().to_rfc3339(),
                if colored {
                    colors.color(record.level()).to_string()
                } else {
                    record.level().to_string()
                },
                record.target(),
                message
            ))
        })
        .level(level)
        .chain(std::io::stdout())
        .apply()?;
    Ok(())
}

/// `-v` count to level: 0 silent-ish (warn and above), 1 info, 2+ debug.
pub fn level_for_verbosity(count: u8) -> log::LevelFilter {
    match count {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        _ => log::LevelFilter::Debug,
    }
}
