// Interactive front end for the Open-JIP fluorometer
//
// Discovers the device, then repeatedly offers to adjust settings, capture a
// transient, report its parameters, store it and plot everything stored so far.

use clap::Parser;
use openjip_rs::fluorometer::DEFAULT_SAMPLE_COUNT;
use openjip_rs::plot::{self, DEFAULT_PLOT_FILE};
use openjip_rs::shutdown::{self, CloseOnDrop, SharedFluorometer, INTERRUPT_EXIT_CODE};
use openjip_rs::Fluorometer;
use openjip_rs::store::DEFAULT_STORE_FILE;
use openjip_rs::{
    compute_parameters, AxisScale, JipConnector, Platform, SessionTiming, Setting, TransientStore,
};
use serialport::SerialPort;
use std::error::Error;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

#[derive(Parser)]
#[command(name = "openjip")]
#[command(version)]
#[command(about = "Operate an Open-JIP chlorophyll fluorometer")]
#[command(long_about = "Capture OJIP fluorescence transients from an Open-JIP fluorometer, \
report Fo, Fj, Fi, Fm, Fv and quantum yield, append every capture to a CSV file and plot \
the stored captures.")]
struct Args {
    /// Serial port of the fluorometer
    #[arg(short, long, help = "Serial port to use instead of discovering one")]
    port: Option<String>,

    /// Samples per transient
    #[arg(
        short = 'n',
        long,
        default_value_t = DEFAULT_SAMPLE_COUNT,
        help = "Number of samples the firmware sends per transient"
    )]
    samples: usize,

    /// CSV file captures are appended to
    #[arg(short, long, default_value = DEFAULT_STORE_FILE)]
    data_file: PathBuf,

    /// HTML file the plot is written to
    #[arg(long, default_value = DEFAULT_PLOT_FILE)]
    plot_file: PathBuf,

    /// Detection gain (1-4)
    #[arg(short, long, help = "Detection gain, 1 (lowest) to 4 (highest)")]
    gain: Option<u8>,

    /// Actinic LED intensity (1-4)
    #[arg(short, long, help = "Actinic LED intensity, 1 (lowest) to 4 (highest)")]
    intensity: Option<u8>,

    /// Per-line read timeout in milliseconds
    #[arg(
        long,
        default_value_t = 5000,
        help = "Give up on a capture when a line takes longer than this (0 waits forever)"
    )]
    line_timeout_ms: u64,

    /// Run a single measurement without prompting
    #[arg(short, long)]
    batch: bool,

    /// Plot stored captures after a batch measurement
    #[arg(long)]
    plot: bool,

    /// Start the plot with a linear time axis
    #[arg(long)]
    linear_time: bool,

    /// Enable verbose logging
    #[arg(short, long, help = "Show debug information and detailed logs")]
    verbose: bool,
}

/// The shared fluorometer and the flag the interrupt handler raises.
struct Session {
    fluorometer: SharedFluorometer<Box<dyn SerialPort>>,
    cancel: Arc<AtomicBool>,
}

impl Session {
    fn lock(&self) -> MutexGuard<'_, Fluorometer> {
        shutdown::lock_session(&self.fluorometer)
    }

    /// Called after every device operation; Ctrl-C during one lands here.
    fn exit_if_interrupted(&self) {
        if shutdown::release_if_interrupted(&self.fluorometer, &self.cancel) {
            std::process::exit(INTERRUPT_EXIT_CODE);
        }
    }
}

fn prompt(question: &str) -> io::Result<String> {
    print!("{question} ");
    io::stdout().flush()?;

    let mut answer = String::new();
    if io::stdin().read_line(&mut answer)? == 0 {
        return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "standard input closed"));
    }
    Ok(answer.trim().to_string())
}

fn confirm(question: &str) -> io::Result<bool> {
    loop {
        match prompt(&format!("{question} (y/n)"))?.to_lowercase().as_str() {
            "y" | "yes" => return Ok(true),
            "n" | "no" => return Ok(false),
            _ => println!("Please answer y or n."),
        }
    }
}

fn choose_port(ports: &[String]) -> usize {
    println!("Which port do you want to connect to:");
    for (i, port) in ports.iter().enumerate() {
        println!("\t{i}. {port}");
    }

    loop {
        match prompt("Port number:") {
            Ok(answer) => match answer.parse() {
                Ok(index) => return index,
                Err(_) => println!("'{answer}' is not a port number."),
            },
            // out of range on purpose; connect reports it as an invalid selection
            Err(_) => return usize::MAX,
        }
    }
}

fn ask_level(setting: Setting) -> io::Result<Option<u8>> {
    let answer = prompt(&format!(
        "Set the {}: (1 (Lowest) - 4 (Highest))",
        setting.as_str()
    ))?;
    Ok(answer.parse().ok())
}

fn apply_level(
    session: &Session,
    setting: Setting,
    level: Option<u8>,
) -> Result<(), Box<dyn Error>> {
    let applied = match level {
        Some(level) => {
            let result = session.lock().apply_setting(setting, level);
            session.exit_if_interrupted();
            result?
        }
        None => false,
    };

    match (applied, level) {
        (true, Some(level)) => println!("{} set to: {}", capitalize(setting.as_str()), level),
        _ => println!("Invalid {}. Default settings will be used.", setting.as_str()),
    }
    Ok(())
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    chars
        .next()
        .map(|first| first.to_uppercase().chain(chars).collect())
        .unwrap_or_default()
}

fn measure(
    session: &Session,
    store: &TransientStore,
    samples: usize,
) -> Result<(), Box<dyn Error>> {
    println!("Measuring fluorescence, please wait...");

    let captured = session.lock().capture(samples);
    session.exit_if_interrupted();
    let transient = match captured {
        Ok(transient) => transient,
        Err(e) => {
            eprintln!("Error: {e}");
            return Ok(());
        }
    };
    println!("Transient captured.");

    match compute_parameters(&transient) {
        Ok(params) => println!("{params}"),
        Err(e) => eprintln!("Error: {e}"),
    }

    // holding the session keeps the interrupt handler from exiting mid-row
    let stored = {
        let _session = session.lock();
        store.append(&transient)
    };
    session.exit_if_interrupted();
    let timestamp = stored?;
    println!("Saved capture from {} to {}", timestamp, store.path().display());
    Ok(())
}

fn plot_store(store: &TransientStore, args: &Args) -> Result<(), Box<dyn Error>> {
    let records = match store.load_all() {
        Ok(records) => records,
        Err(e) => {
            eprintln!("Error: {e}");
            return Ok(());
        }
    };

    let scale = if args.linear_time {
        AxisScale::Linear
    } else {
        AxisScale::Log
    };
    plot::write_html(&records, scale, &args.plot_file)?;
    println!(
        "Plotted {} transients to {}",
        records.len(),
        args.plot_file.display()
    );
    Ok(())
}

fn run(args: &Args) -> Result<(), Box<dyn Error>> {
    let line_timeout =
        (args.line_timeout_ms > 0).then(|| Duration::from_millis(args.line_timeout_ms));
    let timing = SessionTiming::default().with_line_timeout(line_timeout);

    let ports = match &args.port {
        Some(port) => vec![port.clone()],
        None => JipConnector::available_ports(Platform::current()?)?,
    };
    let fluorometer = JipConnector::connect(&ports, choose_port, timing)?;
    println!("Connected to Open-JIP fluorometer on {}.", fluorometer.port());

    let session = Session {
        cancel: fluorometer.cancel_handle(),
        fluorometer: Arc::new(Mutex::new(fluorometer)),
    };
    let _close_on_exit = CloseOnDrop::new(Arc::clone(&session.fluorometer));
    shutdown::install_interrupt_handler(
        Arc::clone(&session.fluorometer),
        Arc::clone(&session.cancel),
    );

    let store = TransientStore::new(&args.data_file);

    if let Some(level) = args.gain {
        apply_level(&session, Setting::Gain, Some(level))?;
    }
    if let Some(level) = args.intensity {
        apply_level(&session, Setting::ActinicIntensity, Some(level))?;
    }

    if args.batch {
        measure(&session, &store, args.samples)?;
        if args.plot {
            plot_store(&store, args)?;
        }
        return Ok(());
    }

    while confirm("Measure fluorescence?")? {
        if confirm("Adjust detection gain and actinic intensity?")? {
            apply_level(&session, Setting::Gain, ask_level(Setting::Gain)?)?;
            let intensity = ask_level(Setting::ActinicIntensity)?;
            apply_level(&session, Setting::ActinicIntensity, intensity)?;
        }

        measure(&session, &store, args.samples)?;

        if confirm("Plot data?")? {
            plot_store(&store, args)?;
        }
    }

    Ok(())
}

fn main() {
    let args = Args::parse();

    if args.verbose {
        env_logger::Builder::from_default_env()
            .filter_level(log::LevelFilter::Debug)
            .init();
    } else {
        env_logger::init();
    }

    if let Err(e) = run(&args) {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
