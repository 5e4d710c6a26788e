use bell_controller::*;
use clap::{Parser, Subcommand};
use color_eyre::eyre::{eyre, Result};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Storage medium root holding the schedule records
    #[arg(short, long, default_value = ".")]
    root: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List schedule templates, marking the active one
    List,
    /// Create a schedule template with seven empty day lists
    Create {
        name: String,
        /// One bell list per weekday instead of a single daily list
        #[arg(long)]
        weekly: bool,
    },
    /// Delete a schedule template
    Delete { name: String },
    /// Rename a schedule template
    Rename { old: String, new: String },
    /// Select the template governing the live schedule
    Activate { name: String },
    /// Show a template's bell list
    Show {
        /// Template name; defaults to the active template
        name: Option<String>,
        /// Day slot 0-6 (Sunday = 0); defaults to today
        #[arg(short, long)]
        day: Option<usize>,
    },
    /// Add a bell to a template's day list
    AddBell {
        template: String,
        /// Bell name shown on the display
        name: String,
        /// Time of day, HH:MM or HHMM
        time: String,
        /// Audio clip path on the medium
        audio: String,
        /// Day slot 0-6 (Sunday = 0); defaults to today
        #[arg(short, long)]
        day: Option<usize>,
    },
    /// Remove a bell from a template's day list
    RemoveBell {
        template: String,
        /// Entry index as printed by `show`
        index: usize,
        /// Day slot 0-6 (Sunday = 0); defaults to today
        #[arg(short, long)]
        day: Option<usize>,
    },
    /// Show the manual preset slots
    Presets,
    /// Edit a manual preset slot
    SetPreset {
        /// Slot 0-3
        index: usize,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        audio: Option<String>,
        #[arg(long, conflicts_with = "disable")]
        enable: bool,
        #[arg(long)]
        disable: bool,
    },
    /// Get or set the bell volume (0-10)
    Volume { level: Option<u8> },
    /// Show the next bell for today on the active schedule
    Next,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();
    color_eyre::install()?;

    let cli = Cli::parse();
    let storage = Storage::open(&cli.root);

    match cli.command {
        Commands::List => {
            let pointer = storage.load_active_name().unwrap_or_default();
            let index = storage.list_templates(&pointer)?;
            if index.templates.is_empty() {
                println!("No templates");
            }
            for template in &index.templates {
                let marker = if template.name == index.active { "*" } else { " " };
                println!("{marker} {} ({})", template.name, template.kind.label());
            }
        }
        Commands::Create { name, weekly } => {
            let kind = if weekly {
                ScheduleKind::Weekly
            } else {
                ScheduleKind::Daily
            };
            storage.create_template(&ScheduleTemplate::new(name.clone(), kind)?)?;
            println!("Created template {name}");
        }
        Commands::Delete { name } => {
            storage.delete_template(&name)?;
            println!("Deleted template {name}");
        }
        Commands::Rename { old, new } => {
            storage.rename_template(&old, &new)?;
            println!("Renamed {old} to {new}");
        }
        Commands::Activate { name } => {
            // Only an existing template may govern the live schedule
            let template = storage.load_template(&name)?;
            storage.store_active_name(&template.name)?;
            println!("Active template is now {name}");
        }
        Commands::Show { name, day } => {
            let template = named_or_active(&storage, name)?;
            let slot = resolve_slot(&template, day)?;
            let list = storage.load_bell_list(&template, slot)?;
            println!(
                "{} ({}), slot {slot}: {} bells",
                template.name,
                template.kind.label(),
                list.len()
            );
            for (i, bell) in list.iter().enumerate() {
                println!("{i:>3}  {}  {:<20} {}", bell.time, bell.name, bell.audio_file);
            }
        }
        Commands::AddBell {
            template,
            name,
            time,
            audio,
            day,
        } => {
            let template = storage.load_template(&template)?;
            let slot = resolve_slot(&template, day)?;
            let mut list = storage.load_bell_list(&template, slot)?;
            let at = list.insert(BellEntry::new(name, parse_time(&time)?, audio)?)?;
            storage.store_bell_list(&template, slot, &list)?;
            println!("Added bell at index {at}");
        }
        Commands::RemoveBell {
            template,
            index,
            day,
        } => {
            let template = storage.load_template(&template)?;
            let slot = resolve_slot(&template, day)?;
            let mut list = storage.load_bell_list(&template, slot)?;
            match list.remove(index) {
                Some(bell) => {
                    storage.store_bell_list(&template, slot, &list)?;
                    println!("Removed {} ({})", bell.name, bell.time);
                }
                None => return Err(eyre!("no bell at index {index}")),
            }
        }
        Commands::Presets => {
            let presets = storage.load_presets()?;
            for (i, preset) in presets.iter().enumerate() {
                let state = if preset.enabled { "enabled " } else { "disabled" };
                println!("{i}  {state}  {:<20} {}", preset.name, preset.audio_file);
            }
        }
        Commands::SetPreset {
            index,
            name,
            audio,
            enable,
            disable,
        } => {
            // Missing record starts from the default empty slots
            let mut presets = storage.load_presets().unwrap_or_default();
            let preset = presets
                .get_mut(index)
                .ok_or_else(|| eyre!("preset slot {index} out of range"))?;
            if let Some(name) = name {
                preset.name = name;
            }
            if let Some(audio) = audio {
                preset.audio_file = audio;
            }
            if enable {
                preset.enabled = true;
            }
            if disable {
                preset.enabled = false;
            }
            storage.store_presets(&presets)?;
            println!("Preset {index} updated");
        }
        Commands::Volume { level } => match level {
            Some(level) if level <= MAX_VOLUME => {
                storage.store_volume(level)?;
                println!("Volume set to {level}");
            }
            Some(level) => return Err(eyre!("volume {level} out of range (0-{MAX_VOLUME})")),
            None => println!("Volume is {}", storage.load_volume()?),
        },
        Commands::Next => {
            let now = SystemClock.now()?;
            let template = named_or_active(&storage, None)?;
            let list = storage.load_bell_list(&template, template.kind.day_slot(now.weekday))?;
            let mut engine = ScheduleEngine::new();
            engine.rebuild(list, &now);
            match engine.next_bell() {
                Some((_, bell)) => println!("{}  {}  {}", bell.time, bell.name, bell.audio_file),
                None => println!("No more bells today"),
            }
        }
    }
    Ok(())
}

/// The named template, or the active one resolved through enumeration
fn named_or_active(storage: &Storage, name: Option<String>) -> Result<ScheduleTemplate> {
    match name {
        Some(name) => Ok(storage.load_template(&name)?),
        None => {
            let pointer = storage.load_active_name().unwrap_or_default();
            let TemplateIndex { templates, active } = storage.list_templates(&pointer)?;
            templates
                .into_iter()
                .find(|t| t.name == active)
                .ok_or_else(|| eyre!("no active template"))
        }
    }
}

/// Day slot for an edit: weekly templates key by weekday (today unless
/// given), daily templates always use slot 0
fn resolve_slot(template: &ScheduleTemplate, day: Option<usize>) -> Result<usize> {
    match template.kind {
        ScheduleKind::Daily => Ok(0),
        ScheduleKind::Weekly => match day {
            Some(day) => DayOfWeek::from_index(day)
                .map(|d| d.index())
                .ok_or_else(|| eyre!("day must be 0-6 (Sunday = 0)")),
            None => Ok(SystemClock.now()?.weekday.index()),
        },
    }
}

/// Accepts `HH:MM` or the raw `hour*100+minute` code
fn parse_time(value: &str) -> Result<BellTime> {
    let time = if let Some((hour, minute)) = value.split_once(':') {
        BellTime::new(hour.trim().parse()?, minute.trim().parse()?)
    } else {
        BellTime::from_code(value.trim().parse()?)
    };
    Ok(time?)
}
