mod settings;

use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use clap::{Parser, Subcommand};
use crossbeam_channel::{Receiver, RecvTimeoutError};

use facereg_core::capture::domain::image_writer::ImageWriter;
use facereg_core::capture::domain::source_spec::SourceSpec;
use facereg_core::capture::infrastructure::image_file_writer::{numbered_frame_path, ImageFileWriter};
use facereg_core::capture::infrastructure::source_factory::create_source;
use facereg_core::detection::domain::detector_params::DetectorParams;
use facereg_core::detection::domain::face_detector::FaceDetector;
use facereg_core::detection::infrastructure::seeta_face_detector::SeetaFaceDetector;
use facereg_core::pipeline::detect_image_use_case::DetectImageUseCase;
use facereg_core::pipeline::train_model_use_case::TrainingOutcome;
use facereg_core::recognition::domain::identity::Recognition;
use facereg_core::recognition::infrastructure::lbph;
use facereg_core::registration::domain::registration_session::RegistrationError;
use facereg_core::registration::infrastructure::fs_sample_store::FsSampleStore;
use facereg_core::session::face_session::{FaceSession, SessionError, SessionStats};
use facereg_core::session::session_event::SessionEvent;
use facereg_core::shared::constants::MODEL_FILE_NAME;

use settings::Settings;

const EVENT_POLL: Duration = Duration::from_millis(250);

/// Face registration, LBPH training and live recognition.
#[derive(Parser)]
#[command(name = "facereg", version)]
struct Cli {
    /// Face database directory (one folder of samples per person).
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Face detector model file (downloaded to the cache when omitted).
    #[arg(long, global = true)]
    model: Option<PathBuf>,

    /// Settings file [default: <config dir>/facereg/settings.json].
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Capture face samples for a person from the camera.
    Register {
        name: String,
        /// Replace the person's existing samples.
        #[arg(long)]
        overwrite: bool,
        /// Frame source: camera:<index|device>, an image directory or a video file.
        #[arg(long, default_value = "camera:0")]
        source: String,
        /// Number of samples to capture (overrides settings).
        #[arg(long)]
        samples: Option<usize>,
        /// Train the classifier once registration completes.
        #[arg(long)]
        train: bool,
    },
    /// Train the classifier on every registered person.
    Train,
    /// Recognise faces in live frames.
    Recognize {
        #[arg(long, default_value = "camera:0")]
        source: String,
        /// Stop after this many frames.
        #[arg(long)]
        frames: Option<usize>,
        /// Write annotated frames to this directory.
        #[arg(long)]
        output_dir: Option<PathBuf>,
        /// Distance below which a face counts as known (overrides settings).
        #[arg(long)]
        threshold: Option<f64>,
    },
    /// List registered persons and their sample counts.
    List,
    /// Delete a person's samples.
    Delete { name: String },
    /// Delete every person and the trained model.
    Clear {
        /// Confirm the deletion.
        #[arg(long)]
        yes: bool,
    },
    /// Show database and model statistics.
    Stats,
    /// Detect faces in a single image.
    Detect {
        image: PathBuf,
        /// Write the image with detected faces outlined.
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Interactive session reading commands from stdin.
    Session,
    /// Print the effective settings.
    Settings {
        /// Save them to the settings file.
        #[arg(long)]
        write: bool,
    },
}

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let mut settings = Settings::load(cli.config.as_deref());
    if cli.data_dir.is_some() {
        settings.data_dir = cli.data_dir;
    }
    if cli.model.is_some() {
        settings.detector_model = cli.model;
    }

    match cli.command {
        Command::Register {
            name,
            overwrite,
            source,
            samples,
            train,
        } => {
            if let Some(n) = samples {
                if n == 0 {
                    return Err("--samples must be at least 1".into());
                }
                settings.session.registration.target_samples = n;
            }
            run_register(&settings, &name, overwrite, &source, train)
        }
        Command::Train => {
            let mut session = build_session(&settings, false)?;
            run_train(&mut session)
        }
        Command::Recognize {
            source,
            frames,
            output_dir,
            threshold,
        } => {
            if let Some(t) = threshold {
                if t.is_nan() || t <= 0.0 {
                    return Err(format!("Threshold must be positive, got {t}").into());
                }
                settings.session.recognition.threshold = t;
            }
            run_recognize(&settings, &source, frames, output_dir.as_deref())
        }
        Command::List => run_list(&build_session(&settings, false)?),
        Command::Delete { name } => {
            let mut session = build_session(&settings, false)?;
            if !session.delete_person(&name)? {
                return Err(format!("No registered person named {name}").into());
            }
            println!("Deleted {name}");
            Ok(())
        }
        Command::Clear { yes } => {
            if !yes {
                return Err("Refusing to delete every profile without --yes".into());
            }
            let removed = build_session(&settings, false)?.clear()?;
            println!("Removed {removed} profiles");
            Ok(())
        }
        Command::Stats => {
            print_stats(&build_session(&settings, false)?.stats()?);
            Ok(())
        }
        Command::Detect { image, output } => run_detect(&settings, &image, output.as_deref()),
        Command::Session => run_session(&settings),
        Command::Settings { write } => {
            println!("{}", serde_json::to_string_pretty(&settings)?);
            if write {
                let path = cli
                    .config
                    .or_else(Settings::default_path)
                    .ok_or("Could not determine the config directory")?;
                settings.save(&path)?;
                eprintln!("Saved {}", path.display());
            }
            Ok(())
        }
    }
}

// --- Construction ---

fn build_session(
    settings: &Settings,
    with_detector: bool,
) -> Result<FaceSession, Box<dyn std::error::Error>> {
    let config = settings.session.clone();
    let data_dir = settings.data_dir();
    log::debug!("Face database: {}", data_dir.display());

    let store = Arc::new(FsSampleStore::new(&data_dir, &config.sample_extension));
    let trainer = lbph::load_trainer(&config.lbph);
    if trainer.is_none() {
        eprintln!("Warning: LBPH classifier unavailable; recognition is disabled");
    }
    let detector_params = config.detector.clone();

    let mut session =
        FaceSession::new(config, store, trainer)?.with_model_file(data_dir.join(MODEL_FILE_NAME));
    if with_detector {
        session = session.with_detector(build_detector(settings, detector_params)?);
    }
    if let Err(e) = session.load_model() {
        log::warn!("Ignoring saved model: {e}");
    }
    Ok(session)
}

fn build_detector(
    settings: &Settings,
    params: DetectorParams,
) -> Result<Box<dyn FaceDetector>, Box<dyn std::error::Error>> {
    let detector = SeetaFaceDetector::resolve(
        settings.detector_model.as_deref(),
        settings.models_dir.as_deref(),
        params,
        Some(Box::new(download_progress)),
    )?;
    Ok(Box::new(detector))
}

fn open_source(session: &mut FaceSession, raw: &str) -> Result<(), Box<dyn std::error::Error>> {
    let spec = SourceSpec::parse(raw)?;
    let source = create_source(&spec, &session.config().capture);
    let info = session.start_camera(source)?;
    eprintln!("Capturing from {} ({}x{})", spec, info.width, info.height);
    Ok(())
}

/// Feeds session events to `on_event` until it returns a value, or until
/// nothing is running anymore and the queue is empty.
fn pump<T>(
    session: &FaceSession,
    events: &Receiver<SessionEvent>,
    mut on_event: impl FnMut(SessionEvent) -> Option<T>,
) -> Option<T> {
    loop {
        match events.recv_timeout(EVENT_POLL) {
            Ok(event) => {
                if let Some(value) = on_event(event) {
                    return Some(value);
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                if !session.is_camera_active() && !session.is_training() {
                    return events.try_iter().find_map(&mut on_event);
                }
            }
            Err(RecvTimeoutError::Disconnected) => return None,
        }
    }
}

// --- Commands ---

fn run_register(
    settings: &Settings,
    name: &str,
    overwrite: bool,
    source: &str,
    train: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut session = build_session(settings, true)?;
    let events = session.events();
    open_source(&mut session, source)?;

    if let Err(e) = session.begin_registration(name, overwrite) {
        session.stop_camera();
        return Err(match e {
            SessionError::Registration(inner @ RegistrationError::AlreadyExists(_)) => {
                format!("{inner} (use --overwrite to replace the existing samples)").into()
            }
            other => other.into(),
        });
    }

    let result = pump(&session, &events, |event| match event {
        SessionEvent::RegistrationProgress {
            captured, target, ..
        } => {
            eprint!("\rCaptured {captured}/{target}");
            None
        }
        SessionEvent::RegistrationComplete { name, samples } => {
            eprintln!();
            Some(Ok((name, samples)))
        }
        SessionEvent::RegistrationCancelled { name, samples } => {
            eprintln!();
            Some(Err(format!(
                "Registration of {name} stopped after {samples} samples"
            )))
        }
        SessionEvent::Error(message) => {
            log::warn!("{message}");
            None
        }
        _ => None,
    });
    session.stop_camera();

    let (name, samples) = result.unwrap_or_else(|| Err("Capture ended early".into()))?;
    println!("Registered {name} with {samples} samples");
    if train {
        run_train(&mut session)?;
    }
    Ok(())
}

fn run_train(session: &mut FaceSession) -> Result<(), Box<dyn std::error::Error>> {
    let events = session.events();
    session.train()?;
    let result = pump(session, &events, |event| match event {
        SessionEvent::TrainingFinished(outcome) => Some(Ok(outcome)),
        SessionEvent::TrainingFailed(message) => Some(Err(message)),
        _ => None,
    });
    session.wait_for_training();

    match result.unwrap_or_else(|| Err("Training ended without a result".into()))? {
        TrainingOutcome::Trained(summary) => {
            for person in &summary.skipped {
                eprintln!("Warning: {person} has no readable samples and was skipped");
            }
            println!(
                "Trained on {} images of {} persons",
                summary.images, summary.persons
            );
            if !summary.persisted {
                eprintln!("Warning: the model was not saved and only lives in this process");
            }
            Ok(())
        }
        outcome => Err(describe_outcome(&outcome).into()),
    }
}

fn run_recognize(
    settings: &Settings,
    source: &str,
    frames: Option<usize>,
    output_dir: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut session = build_session(settings, true)?.with_frame_events(true);
    if !session.model_slot().is_ready() {
        eprintln!("Warning: no trained model; faces are only detected. Run `facereg train` first.");
    }
    if let Some(dir) = output_dir {
        std::fs::create_dir_all(dir)?;
    }
    let events = session.events();
    open_source(&mut session, source)?;

    let writer = ImageFileWriter::new();
    let mut seen = 0usize;
    let mut write_error = None;
    pump(&session, &events, |event| match event {
        SessionEvent::Recognized(recognitions) => {
            println!("{}", describe_recognitions(&recognitions));
            None
        }
        SessionEvent::Frame(frame) => {
            seen += 1;
            if let Some(dir) = output_dir {
                if let Err(e) = writer.write(&numbered_frame_path(dir, &frame), &frame) {
                    write_error = Some(e.to_string());
                    return Some(());
                }
            }
            frames.is_some_and(|n| seen >= n).then_some(())
        }
        SessionEvent::Error(message) => {
            log::warn!("{message}");
            None
        }
        SessionEvent::CameraStopped => Some(()),
        _ => None,
    });
    session.stop_camera();

    if let Some(e) = write_error {
        return Err(e.into());
    }
    eprintln!("Processed {seen} frames");
    Ok(())
}

fn run_list(session: &FaceSession) -> Result<(), Box<dyn std::error::Error>> {
    let persons = session.persons()?;
    if persons.is_empty() {
        println!("No registered persons");
    }
    for (name, count) in persons {
        println!("{name}\t{count}");
    }
    Ok(())
}

fn run_detect(
    settings: &Settings,
    image: &Path,
    output: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let detector = build_detector(settings, settings.session.detector.clone())?;
    let mut use_case = DetectImageUseCase::new(detector, Box::new(ImageFileWriter::new()));
    let faces = use_case.execute(image, output)?;
    for face in &faces {
        println!("{}\t{}\t{}\t{}", face.x, face.y, face.width, face.height);
    }
    eprintln!("{} face(s) found", faces.len());
    if let Some(path) = output {
        eprintln!("Output written to {}", path.display());
    }
    Ok(())
}

// --- Interactive session ---

const SESSION_HELP: &str = "\
commands:
  start [source]            start the camera (default camera:0)
  stop                      stop the camera
  register <name> [overwrite]
  cancel                    abort the current registration
  train                     retrain on every registered person
  list                      registered persons
  delete <name>
  clear                     delete every person
  stats
  quit";

fn run_session(settings: &Settings) -> Result<(), Box<dyn std::error::Error>> {
    let mut session = build_session(settings, true)?;
    let events = session.events();
    let printer = thread::spawn(move || {
        for event in events.iter() {
            if let Some(line) = describe_event(&event) {
                println!("{line}");
            }
        }
    });

    println!("{SESSION_HELP}");
    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = line?;
        let words: Vec<&str> = line.split_whitespace().collect();
        match words.as_slice() {
            [] => {}
            ["quit" | "exit"] => break,
            ["help"] => println!("{SESSION_HELP}"),
            command => {
                if let Err(e) = session_command(&mut session, command) {
                    eprintln!("error: {e}");
                }
            }
        }
        io::stdout().flush()?;
    }

    drop(session);
    if printer.join().is_err() {
        log::error!("Event printer panicked");
    }
    Ok(())
}

fn session_command(
    session: &mut FaceSession,
    words: &[&str],
) -> Result<(), Box<dyn std::error::Error>> {
    match words {
        ["start"] => open_source(session, "camera:0"),
        ["start", source] => open_source(session, source),
        ["stop"] => {
            if !session.stop_camera() {
                eprintln!("camera is not running");
            }
            Ok(())
        }
        ["register", name] => register_interactive(session, name, false),
        ["register", name, "overwrite"] => register_interactive(session, name, true),
        ["cancel"] => {
            if session.cancel_registration().is_none() {
                eprintln!("no registration in progress");
            }
            Ok(())
        }
        ["train"] => session.train().map_err(Into::into),
        ["list"] => run_list(session),
        ["delete", name] => {
            if !session.delete_person(name)? {
                eprintln!("no registered person named {name}");
            }
            Ok(())
        }
        ["clear"] => session.clear().map(drop).map_err(Into::into),
        ["stats"] => {
            print_stats(&session.stats()?);
            Ok(())
        }
        other => Err(format!("unknown command: {}", other.join(" ")).into()),
    }
}

fn register_interactive(
    session: &mut FaceSession,
    name: &str,
    overwrite: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    match session.begin_registration(name, overwrite) {
        Ok(_) => Ok(()),
        Err(SessionError::Registration(RegistrationError::AlreadyExists(name))) => Err(format!(
            "{name} is already registered; use `register {name} overwrite` to replace"
        )
        .into()),
        Err(e) => Err(e.into()),
    }
}

// --- Output ---

fn describe_event(event: &SessionEvent) -> Option<String> {
    match event {
        SessionEvent::Log(message) => Some(message.clone()),
        SessionEvent::CameraStarted(info) => Some(format!(
            "Camera started: {} ({}x{})",
            info.description, info.width, info.height
        )),
        SessionEvent::CameraStopped => Some("Camera stopped".into()),
        SessionEvent::Error(message) => Some(format!("error: {message}")),
        SessionEvent::RegistrationProgress {
            name,
            captured,
            target,
        } => Some(format!("{name}: {captured}/{target}")),
        SessionEvent::RegistrationCancelled { name, samples } => Some(format!(
            "Registration of {name} cancelled after {samples} samples"
        )),
        SessionEvent::Recognized(recognitions) => Some(describe_recognitions(recognitions)),
        SessionEvent::TrainingStarted => Some("Training...".into()),
        SessionEvent::TrainingFinished(outcome) => Some(describe_outcome(outcome)),
        SessionEvent::TrainingFailed(message) => Some(format!("Training failed: {message}")),
        // Already announced through Log.
        SessionEvent::RegistrationStarted { .. }
        | SessionEvent::RegistrationComplete { .. }
        | SessionEvent::PersonDeleted(_)
        | SessionEvent::ProfilesCleared
        | SessionEvent::Frame(_) => None,
    }
}

fn describe_outcome(outcome: &TrainingOutcome) -> String {
    match outcome {
        TrainingOutcome::Trained(summary) => format!(
            "Training complete: {} persons, {} images",
            summary.persons, summary.images
        ),
        TrainingOutcome::NoProfiles => "No registered persons to train on".into(),
        TrainingOutcome::NoValidImages => "No readable face samples to train on".into(),
        TrainingOutcome::Unavailable => "LBPH classifier is unavailable".into(),
    }
}

fn describe_recognitions(recognitions: &[Recognition]) -> String {
    recognitions
        .iter()
        .map(|r| r.identity.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

fn print_stats(stats: &SessionStats) {
    println!("persons:         {}", stats.persons);
    println!("samples:         {}", stats.samples);
    println!("trained labels:  {}", stats.trained_labels);
    println!("threshold:       {}", stats.threshold);
    println!("model loaded:    {}", stats.model_ready);
    let classifier = if stats.recognition_available {
        "available"
    } else {
        "unavailable"
    };
    println!("classifier:      {classifier}");
    let camera = if stats.camera_active { "running" } else { "stopped" };
    println!("camera:          {camera}");
    if let Some(name) = &stats.registering {
        println!("registering:     {name}");
    }
}

fn download_progress(downloaded: u64, total: u64) {
    if total > 0 {
        let pct = (downloaded as f64 / total as f64 * 100.0) as u32;
        eprint!("\rDownloading face detection model... {pct}%");
        if downloaded >= total {
            eprintln!();
        }
    } else {
        eprint!("\rDownloading face detection model... {downloaded} bytes");
    }
}
