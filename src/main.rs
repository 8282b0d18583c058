use std::collections::HashSet;
use std::io::{self, BufRead, Read, Write};

use anyhow::{anyhow, Context, Result};
use clap::Parser as ClapParser;
use subcue::timecode::parse_timecode_arg;
use subcue::{
    serialiser, Cue, CueId, CueIndex, DiffEngine, DiffEvents, Format, Parser, ParserConfig,
    Presenter,
};

fn main() {
    match run() {
        Ok(()) => (),
        Err(err) => {
            eprintln!("An error occurred: {}", err);
            for cause in err.chain().skip(1) {
                eprintln!("    {}", cause);
            }
            std::process::exit(1);
        }
    }
}

#[derive(ClapParser)]
#[command(about = "Replay a subtitle document against a stream of timecodes")]
struct Cli {
    #[arg(
        short,
        long,
        value_name = "FILE",
        help = "The file to read from. If not supplied, the subtitles will be read from standard input.",
        default_value = "-"
    )]
    input: String,
    #[arg(
        short,
        long,
        value_name = "FILE",
        help = "Also write the parsed cues to the specified file as SRT."
    )]
    output: Option<String>,
    #[arg(long, help = "Abort on the first malformed cue instead of skipping it.")]
    strict: bool,
    #[arg(long, value_enum, help = "Input format. Detected from the content when omitted.")]
    format: Option<Format>,
    #[arg(
        long,
        value_name = "BYTES",
        default_value_t = ParserConfig::DEFAULT_MAX_CUE_BYTES,
        help = "Reject cue blocks larger than this."
    )]
    max_cue_bytes: usize,
    #[arg(
        long,
        value_name = "WIDTHxHEIGHT",
        value_parser = parse_viewport,
        help = "Size of the area subtitles are drawn into."
    )]
    viewport: Option<(u32, u32)>,
    #[arg(short, long, action = clap::ArgAction::Count, help = "Increase log verbosity.")]
    verbose: u8,
    #[arg(
        value_name = "TIMECODE",
        help = "Playback positions in milliseconds or as HH:MM:SS,mmm. Read from standard input, one per line, when none are given."
    )]
    timecodes: Vec<String>,
}

fn parse_viewport(value: &str) -> std::result::Result<(u32, u32), String> {
    let (width, height) = value
        .split_once(|c: char| c == 'x' || c == 'X')
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got '{}'", value))?;
    let width = width.trim().parse().map_err(|_| format!("invalid width '{}'", width))?;
    let height = height.trim().parse().map_err(|_| format!("invalid height '{}'", height))?;
    Ok((width, height))
}

fn setup_logger(level: u8) {
    let mut builder = pretty_env_logger::formatted_timed_builder();

    let log_level = match level {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    builder.filter_level(log_level);
    builder.format_timestamp_millis();
    builder.init();
}

/// Prints events to standard output and remembers what is on screen.
struct Console<W: Write> {
    out: W,
    shown: HashSet<CueId>,
}

impl<W: Write> Presenter for Console<W> {
    fn show(&mut self, cue: &Cue) {
        let text = cue.plain_text().replace('\n', " / ");
        if let Err(e) = writeln!(self.out, "show {} {}-{} {}", cue.id, cue.start, cue.end, text) {
            log::error!("Failed to write event: {}", e);
        }
        self.shown.insert(cue.id.clone());
    }

    fn hide(&mut self, id: &CueId) {
        if let Err(e) = writeln!(self.out, "hide {}", id) {
            log::error!("Failed to write event: {}", e);
        }
        self.shown.remove(id);
    }

    fn exists(&self, id: &CueId) -> bool {
        self.shown.contains(id)
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    setup_logger(cli.verbose);

    let stdin_document = cli.input == "-";
    if stdin_document && cli.timecodes.is_empty() && cli.output.is_none() {
        return Err(anyhow!(
            "Timecodes must be given as arguments when the subtitles are read from standard input."
        ));
    }

    let data = if stdin_document {
        let mut buffer = String::new();
        io::stdin()
            .read_to_string(&mut buffer)
            .context("Failed to read from stdin")?;
        buffer
    } else {
        std::fs::read_to_string(&cli.input)
            .context(format!("Failed to open input file: '{}'", cli.input))?
    };

    let mut config = ParserConfig::default().with_max_cue_bytes(cli.max_cue_bytes);
    if cli.strict {
        config = config.strict();
    }
    if let Some(format) = cli.format {
        config = config.with_format(format);
    }

    let outcome = Parser::with_config(config)
        .parse(&data)
        .context(format!("Failed to parse subtitle file: '{}'", cli.input))?;
    if outcome.document.is_empty() {
        return Err(anyhow!("You appear to have supplied a file without any usable cues."));
    }
    if !outcome.diagnostics.is_empty() {
        log::info!("{} cue blocks were skipped", outcome.diagnostics.len());
    }

    if let Some(output) = &cli.output {
        serialiser::write_file(&outcome.document, output)
            .context(format!("Failed to write output file: '{}'", output))?;
    }

    if stdin_document && cli.timecodes.is_empty() {
        return Ok(());
    }

    let mut engine = DiffEngine::with_index(CueIndex::build(outcome.document));
    if let Some((width, height)) = cli.viewport {
        engine.set_viewport(width, height);
    }

    let mut console = Console {
        out: io::stdout().lock(),
        shown: HashSet::new(),
    };

    if cli.timecodes.is_empty() {
        for line in io::stdin().lock().lines() {
            let line = line.context("Failed to read timecodes from stdin")?;
            feed(&mut engine, &mut console, line.trim());
        }
    } else {
        for timecode in &cli.timecodes {
            feed(&mut engine, &mut console, timecode);
        }
    }
    console.out.flush()?;
    Ok(())
}

/// Applies one line of the timecode feed. A bad timecode only loses that
/// one update.
fn feed<P: Presenter>(engine: &mut DiffEngine, presenter: &mut P, line: &str) {
    if line.is_empty() {
        return;
    }
    let events: subcue::Result<DiffEvents> = if line == "reset" {
        Ok(engine.reset())
    } else {
        parse_timecode_arg(line).and_then(|ms| {
            let t = i64::try_from(ms).map_err(|_| subcue::SubcueError::InvalidTimecode(line.to_string()))?;
            engine.update(t)
        })
    };
    match events {
        Ok(events) => events.apply(presenter),
        Err(err) => log::error!("Ignoring '{}': {}", line, err),
    }
}
