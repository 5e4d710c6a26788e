use bell_controller::*;
use std::env;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::AsyncBufReadExt;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Default volume level when no `volume.bin` record exists yet
const DEFAULT_VOLUME: u8 = 5;

#[tokio::main]
async fn main() -> color_eyre::eyre::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();
    color_eyre::install()?;

    // Get the storage medium root from command line arguments.
    // If not provided, exit.
    let usage = "Usage: belld <storage root>";
    let args: Vec<_> = env::args().collect();
    if args.len() < 2 {
        eprintln!("{usage}");
        std::process::exit(1);
    }
    if args[1] == "-h" || args[1] == "--help" {
        eprintln!("{usage}");
        std::process::exit(0);
    }

    let storage = Storage::open(&args[1]);
    if !storage.is_available() {
        // One-time alert; the schedule degrades to an empty list
        warn!("storage medium missing, running with an empty schedule");
    }

    let clock = SystemClock;
    let shared = AudioShared::new();
    let mut coordinator = AudioCoordinator::new(shared.clone(), LogOutputs::default());

    let volume = Arc::new(AtomicU8::new(
        storage.load_volume().unwrap_or(DEFAULT_VOLUME),
    ));

    // Audio-rendering context: own OS thread so the decoder pump is never
    // stalled by the scheduling loop. It polls the shared flags once per
    // second and drives the renderer continuously.
    let stop_flag = Arc::new(AtomicBool::new(false));
    let audio_stop = stop_flag.clone();
    let audio_shared = shared.clone();
    let audio_volume = volume.clone();
    let audio_thread = std::thread::spawn(move || {
        let mut pump = AudioPump::new(audio_shared, SilentRenderer::default());
        let mut last_poll = Instant::now() - Duration::from_secs(1);
        while !audio_stop.load(Ordering::Relaxed) {
            if last_poll.elapsed() >= Duration::from_secs(1) {
                last_poll = Instant::now();
                pump.set_gain(volume_to_gain(audio_volume.load(Ordering::Relaxed)));
                pump.poll();
            }
            pump.pump();
            std::thread::sleep(Duration::from_millis(5));
        }
    });

    // Scheduling context state
    let mut presets = storage.load_presets().unwrap_or_default();
    let mut active = resolve_active(&storage);
    match &active {
        Some(template) => {
            info!(template = %template.name, kind = template.kind.label(), "active schedule")
        }
        None => warn!("no active schedule template"),
    }

    let mut now = clock.now().unwrap_or(WallTime::new(0, 0, 0, DayOfWeek::Sunday, 1));
    let mut clock_alerted = false;
    let mut engine = ScheduleEngine::new();
    engine.rebuild(load_today(&storage, active.as_ref(), &now), &now);

    println!("OK");

    // Mainloop: once-per-second matching plus line commands on stdin
    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
    let mut ticker = tokio::time::interval(Duration::from_millis(250));
    let mut last_second = now.second;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match clock.now() {
                    Ok(t) => now = t,
                    Err(err) => {
                        if !clock_alerted {
                            clock_alerted = true;
                            error!(%err, "clock fault, matching continues on last known time");
                        }
                    }
                }
                if now.second != last_second {
                    last_second = now.second;
                    if engine.day_rolled(&now) {
                        info!(day = %now.weekday, "day rollover");
                        engine.rebuild(load_today(&storage, active.as_ref(), &now), &now);
                    }
                    if let Some(index) = engine.tick(&now) {
                        if let Some(bell) = engine.today().get(index) {
                            coordinator.ring(&bell.name, &bell.audio_file);
                        }
                    }
                    if engine.next_changed() {
                        match engine.next_bell() {
                            Some((_, bell)) => {
                                info!(time = %bell.time, name = %bell.name, file = %bell.audio_file, "next bell")
                            }
                            None => info!("no more bells today"),
                        }
                    }
                }
                coordinator.service();
            }
            line = lines.next_line() => {
                let Some(line) = line? else { break };

                // Read command and execute it
                let mut cmd = line.trim().split(':');
                match cmd.next() {
                    Some("manual") => {
                        let index = match cmd.next().and_then(|s| s.trim().parse::<usize>().ok()) {
                            Some(index) => index,
                            None => {
                                eprintln!("ERR Usage: manual:<slot 0-3>");
                                continue;
                            }
                        };
                        if coordinator.ring_preset(&presets, index) {
                            println!("OK");
                        } else {
                            eprintln!("ERR Preset {index} is disabled or out of range");
                        }
                    }
                    Some("volume") => {
                        let level = match cmd.next().and_then(|s| s.trim().parse::<u8>().ok()) {
                            Some(level) if level <= MAX_VOLUME => level,
                            _ => {
                                eprintln!("ERR Volume must be between 0 and {MAX_VOLUME}");
                                continue;
                            }
                        };
                        volume.store(level, Ordering::Relaxed);
                        if let Err(err) = storage.store_volume(level) {
                            eprintln!("ERR {err}");
                            continue;
                        }
                        println!("OK");
                    }
                    Some("reload") => {
                        presets = storage.load_presets().unwrap_or_default();
                        active = resolve_active(&storage);
                        engine.rebuild(load_today(&storage, active.as_ref(), &now), &now);
                        println!("OK");
                    }
                    Some("status") => {
                        let template = active
                            .as_ref()
                            .map(|t| t.name.as_str())
                            .unwrap_or("(none)");
                        let next = match engine.next_bell() {
                            Some((_, bell)) => format!("{} {}", bell.time, bell.name),
                            None => "none".to_string(),
                        };
                        println!(
                            "OK template={template} bells={} next={next} playing={}",
                            engine.today().len(),
                            shared.is_playing()
                        );
                    }
                    Some(other) => {
                        eprintln!("ERR Unknown command: {other}");
                    }
                    None => {
                        eprintln!("ERR No command given");
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("shutting down");
                break;
            }
        }
    }

    stop_flag.store(true, Ordering::Relaxed);
    if audio_thread.join().is_err() {
        error!("audio context panicked");
    }
    Ok(())
}

/// Resolves the active template through the enumeration side effect: a
/// dangling pointer adopts the last enumerated template.
fn resolve_active(storage: &Storage) -> Option<ScheduleTemplate> {
    let pointer = storage.load_active_name().unwrap_or_default();
    match storage.list_templates(&pointer) {
        Ok(TemplateIndex { templates, active }) => {
            templates.into_iter().find(|t| t.name == active)
        }
        Err(err) => {
            warn!(%err, "could not enumerate templates");
            None
        }
    }
}

/// Today's bell list for the active template; storage trouble degrades to
/// an empty list and the engine idles harmlessly.
fn load_today(storage: &Storage, active: Option<&ScheduleTemplate>, now: &WallTime) -> BellList {
    let Some(template) = active else {
        return BellList::new();
    };
    match storage.load_bell_list(template, template.kind.day_slot(now.weekday)) {
        Ok(list) => list,
        Err(err) => {
            warn!(%err, template = %template.name, "could not load today's bells");
            BellList::new()
        }
    }
}
