// converter.rs - Batch orchestration: runs, outcomes and archiving state

use crate::compression::{OutputFormat, RecompressOptions, Recompressor};
use crate::error::ConvertError;
use crate::export::ArchiveEntry;
use crate::registry::{ConvertedFile, FileRegistry, ItemId, StatusKind};
use crate::source::SourceFile;
use std::sync::Arc;

/// Shown to the user for any failed item; the cause only goes to the log.
pub const CONVERSION_FAILED: &str = "Conversion failed";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConversionSettings {
    pub quality: u8,
    pub max_dimension: u32,
    pub max_size_bytes: u64,
}

impl ConversionSettings {
    pub fn new(quality: u8, max_dimension: u32, max_size_bytes: u64) -> Self {
        Self {
            quality: quality.clamp(1, 100),
            max_dimension: max_dimension.max(1),
            max_size_bytes,
        }
    }

    pub fn options(&self) -> RecompressOptions {
        RecompressOptions {
            max_size_bytes: self.max_size_bytes,
            max_dimension: self.max_dimension,
            output_format: OutputFormat::WebP,
            quality: f32::from(self.quality) / 100.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RunId(u64);

/// One item of a batch run. The settings are fixed when the run starts.
#[derive(Debug, Clone)]
pub struct ConversionJob {
    pub run: RunId,
    pub item: ItemId,
    pub source: SourceFile,
    pub settings: ConversionSettings,
}

#[derive(Debug, Clone)]
pub struct ItemOutcome {
    pub run: RunId,
    pub item: ItemId,
    /// The error side carries the full cause for logging.
    pub result: Result<ConvertedFile, String>,
}

#[derive(Debug)]
struct ActiveRun {
    id: RunId,
    total: usize,
    settled: usize,
}

/// Owns the registry and is the only place that mutates it. Every call that
/// can make work runnable hands back the jobs of the run it started.
#[derive(Debug, Default)]
pub struct BatchConverter {
    registry: FileRegistry,
    active: Option<ActiveRun>,
    next_run: u64,
    archiving: bool,
}

impl BatchConverter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn registry(&self) -> &FileRegistry {
        &self.registry
    }

    pub fn add_files(
        &mut self,
        files: Vec<SourceFile>,
        settings: ConversionSettings,
    ) -> Vec<ConversionJob> {
        let offered = files.len();
        let added = self.registry.add(files);
        log::info!("Added {} of {} files", added, offered);
        self.start_pending(settings)
    }

    /// Starts a run over every pending item unless one is already in flight.
    pub fn start_pending(&mut self, settings: ConversionSettings) -> Vec<ConversionJob> {
        if self.active.is_some() {
            return Vec::new();
        }

        let pending = self.registry.ids_with(StatusKind::Pending);
        if pending.is_empty() {
            return Vec::new();
        }

        self.next_run += 1;
        let run = RunId(self.next_run);
        let mut jobs = Vec::with_capacity(pending.len());
        for id in pending {
            if self.registry.mark_converting(id).is_err() {
                continue;
            }
            if let Some(item) = self.registry.get(id) {
                jobs.push(ConversionJob {
                    run,
                    item: id,
                    source: item.source().clone(),
                    settings,
                });
            }
        }

        log::info!(
            "Starting run {} with {} items (quality {}, max {}px)",
            run.0,
            jobs.len(),
            settings.quality,
            settings.max_dimension
        );
        self.active = Some(ActiveRun {
            id: run,
            total: jobs.len(),
            settled: 0,
        });
        jobs
    }

    /// Records one finished task. When it was the last of its run, any items
    /// that became pending meanwhile start a new run with `settings`.
    pub fn apply(&mut self, outcome: ItemOutcome, settings: ConversionSettings) -> Vec<ConversionJob> {
        let ItemOutcome { run, item, result } = outcome;

        let Some(active) = self.active.as_mut().filter(|active| active.id == run) else {
            log::warn!("Ignoring outcome for {} from finished run {}", item, run.0);
            return Vec::new();
        };
        active.settled += 1;
        let run_settled = active.settled >= active.total;

        let applied = match result {
            Ok(converted) => {
                log::debug!("{} converted to {} ({} bytes)", item, converted.name, converted.size());
                self.registry.mark_done(item, converted)
            }
            Err(cause) => {
                log::error!("{} failed: {}", item, cause);
                self.registry.mark_failed(item, CONVERSION_FAILED)
            }
        };
        if let Err(e) = applied {
            log::debug!("Outcome not applied: {}", e);
        }

        if !run_settled {
            return Vec::new();
        }

        log::info!(
            "Run {} settled: {} done, {} failed",
            run.0,
            self.registry.count(StatusKind::Done),
            self.registry.count(StatusKind::Error)
        );
        self.active = None;
        self.start_pending(settings)
    }

    pub fn reconvert(&mut self, settings: ConversionSettings) -> Vec<ConversionJob> {
        let reset = self.registry.reconvert();
        log::info!("Re-queued {} items", reset);
        self.start_pending(settings)
    }

    /// Drops every item. Tasks still in flight settle into nothing.
    pub fn clear(&mut self) {
        let released = self.registry.clear();
        log::info!("Cleared batch, released {} previews", released);
    }

    pub fn is_processing(&self) -> bool {
        self.active.is_some()
    }

    /// `(settled, total)` of the run in flight.
    pub fn progress(&self) -> Option<(usize, usize)> {
        self.active.as_ref().map(|active| (active.settled, active.total))
    }

    pub fn converted(&self, id: ItemId) -> Option<ConvertedFile> {
        self.registry.get(id).and_then(|item| item.result()).cloned()
    }

    /// Raises the archiving flag and returns the done entries, or `None` if
    /// an archive is already being written or nothing is done.
    pub fn begin_archive(&mut self) -> Option<Vec<ArchiveEntry>> {
        if self.archiving {
            return None;
        }
        let entries: Vec<ArchiveEntry> = self
            .registry
            .done_results()
            .into_iter()
            .map(ArchiveEntry::from)
            .collect();
        if entries.is_empty() {
            return None;
        }
        self.archiving = true;
        Some(entries)
    }

    pub fn finish_archive(&mut self) {
        self.archiving = false;
    }

    pub fn is_archiving(&self) -> bool {
        self.archiving
    }
}

/// Output name for a source: the last extension becomes `.webp`.
pub fn webp_file_name(source_name: &str) -> String {
    let extension = OutputFormat::WebP.file_extension();
    match source_name.rfind('.') {
        Some(dot) if dot > 0 => format!("{}.{}", &source_name[..dot], extension),
        _ => format!("{}.{}", source_name, extension),
    }
}

pub fn convert_source(
    source: &SourceFile,
    settings: &ConversionSettings,
    compressor: &dyn Recompressor,
) -> Result<ConvertedFile, ConvertError> {
    let input = source.read().map_err(|e| ConvertError::Read {
        path: source.path.clone(),
        source: e,
    })?;
    let options = settings.options();
    let data = compressor.recompress(&input, &options)?;

    Ok(ConvertedFile {
        name: webp_file_name(&source.name),
        mime_type: options.output_format.mime_type().to_string(),
        data: Arc::new(data),
    })
}

pub async fn convert(job: ConversionJob, compressor: Arc<dyn Recompressor>) -> ItemOutcome {
    let ConversionJob {
        run,
        item,
        source,
        settings,
    } = job;

    let result = tokio::task::spawn_blocking(move || {
        convert_source(&source, &settings, compressor.as_ref())
    })
    .await
    .unwrap_or_else(|e| Err(ConvertError::Worker(e.to_string())))
    .map_err(|e| e.to_string());

    ItemOutcome { run, item, result }
}
