//! Bulk import of postal codes from CSV files.
//!
//! A run reads `code,city_name,county_name` rows, resolves the county and city of
//! every row through a run-scoped [`cache::LookupCache`] and inserts postal codes
//! that do not exist yet. The whole run is one transaction: it either commits
//! every row or leaves storage untouched.

pub mod cache;
pub mod source;
pub mod store;

use std::{fs::File, io::Read, path::Path};

use tracing::instrument;

use crate::{
    import::{
        cache::LookupCache,
        source::{PostalCodeSource, SourceRow},
        store::{ImportBackend, ImportStore},
    },
    model::{
        apperror::{ApplicationError, ErrorType},
        config::ImportConfig,
    },
};

/**
 * Counters reported at the end of a committed run.
 */
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportReport {
    /**
     * Postal codes inserted.
     */
    pub created: u64,
    /**
     * Rows whose postal code already existed. The stored row was left untouched.
     */
    pub duplicates: u64,
    /**
     * Rows with an empty or missing field.
     */
    pub skipped: u64,
    pub counties_created: u64,
    pub cities_created: u64,
}

impl ImportReport {
    /**
     * Rows that reached the postal code step.
     */
    pub fn processed(&self) -> u64 {
        self.created + self.duplicates
    }
}

/**
 * Imports postal code CSV files through an `ImportBackend`.
 *
 * The CSV is read with blocking I/O, so runs belong to the `import` command and not
 * to the HTTP workers.
 */
pub struct PostalCodeImporter<B: ImportBackend> {
    backend: B,
    import_config: ImportConfig,
}

impl<B: ImportBackend> PostalCodeImporter<B> {
    pub fn new(backend: B, import_config: ImportConfig) -> Self {
        PostalCodeImporter { backend, import_config }
    }

    /**
     * Imports the CSV file at `path`.
     *
     * # Returns
     * The report of a committed run, or the error that rolled the run back.
     */
    #[instrument(skip(self), fields(path = %path.display()))]
    pub async fn import_file(&self, path: &Path) -> Result<ImportReport, ApplicationError> {
        let file = File::open(path).map_err(|err| ApplicationError::new(ErrorType::Import, format!("Failed to open import file {}: {err}", path.display())))?;
        self.import_reader(file).await
    }

    /**
     * Imports CSV rows from the reader inside a single transaction.
     *
     * # Returns
     * The report of a committed run, or the error that rolled the run back.
     */
    pub async fn import_reader<R: Read>(&self, reader: R) -> Result<ImportReport, ApplicationError> {
        tracing::info!("Starting postal code import");
        let mut store = self.backend.begin().await?;
        match self.reconcile(&mut store, reader).await {
            Ok(report) => {
                store.commit().await?;
                tracing::info!(
                    created = report.created,
                    duplicates = report.duplicates,
                    skipped = report.skipped,
                    counties_created = report.counties_created,
                    cities_created = report.cities_created,
                    "Import completed"
                );
                Ok(report)
            }
            Err(err) => {
                tracing::error!("Import failed, rolling back: {}", err);
                if let Err(rollback_err) = store.rollback().await {
                    tracing::error!("Rollback of failed import failed: {}", rollback_err);
                }
                Err(err)
            }
        }
    }

    /**
     * Applies every row to the open store.
     */
    async fn reconcile<S: ImportStore, R: Read>(&self, store: &mut S, reader: R) -> Result<ImportReport, ApplicationError> {
        let mut source = PostalCodeSource::new(reader, self.import_config.header_lines)?;
        let mut cache = LookupCache::new(store.county_ids().await?);
        let mut report = ImportReport::default();
        while let Some(row) = source.next_row()? {
            let record = match row {
                SourceRow::Complete(record) => record,
                SourceRow::Incomplete { line } => {
                    tracing::debug!("Skipping incomplete row on line {}", line);
                    report.skipped += 1;
                    continue;
                }
            };
            let county = cache.resolve_county(store, &record.county_name).await?;
            if county.created {
                report.counties_created += 1;
                tracing::info!("New county created: {}", record.county_name);
            }
            let city = cache.resolve_city(store, &record.city_name, &record.county_name, county.id).await?;
            if city.created {
                report.cities_created += 1;
            }
            if store.add_postal_code_if_absent(&record.code, city.id).await? {
                report.created += 1;
            } else {
                tracing::debug!("Postal code {} already exists", record.code);
                report.duplicates += 1;
            }
            self.report_progress(&report);
        }
        let (county_lookups, city_lookups) = cache.storage_lookups();
        tracing::debug!("Resolved parents with {} county and {} city lookups", county_lookups, city_lookups);
        Ok(report)
    }

    fn report_progress(&self, report: &ImportReport) {
        let interval = self.import_config.progress_interval;
        if interval > 0 && report.processed() % interval == 0 {
            tracing::info!("Processed {} records...", report.processed());
        }
    }
}
