//! Incremental ingestion of scraped form records.

use anyhow::Context;
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info};

use crate::error::Result;
use crate::form::FormRecord;
use crate::storage::{FormProvider, FormStore, MeetingStore};

/// Form records keyed by selection link, loaded from a JSON file.
///
/// ```json
/// { "https://example.com/horse/1": [ { "race_date": "2024-05-10", ... } ] }
/// ```
#[derive(Debug, Clone, Default)]
pub struct JsonFormProvider {
    forms: HashMap<String, Vec<FormRecord>>,
}

impl JsonFormProvider {
    pub fn from_path(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read form file: {}", path.display()))?;
        Self::from_json(&text).with_context(|| format!("Invalid form file: {}", path.display()))
    }

    pub fn from_json(text: &str) -> anyhow::Result<Self> {
        let forms = serde_json::from_str(text)?;
        Ok(Self { forms })
    }
}

impl FormProvider for JsonFormProvider {
    fn fetch_form(&self, selection_link: &str) -> Result<Vec<FormRecord>> {
        Ok(self.forms.get(selection_link).cloned().unwrap_or_default())
    }
}

/// Summary of one sync run
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct FormSyncReport {
    pub runners: usize,
    pub inserted: usize,
    /// Records not newer than the stored history
    pub skipped: usize,
}

/// Pull form for every runner of `event_date` into the store.
///
/// A selection without stored history gets every fetched record; otherwise
/// only records dated after its last stored run are inserted. A failed fetch
/// aborts the sync; records inserted before it stay stored.
pub fn sync_forms<P, S>(provider: &P, store: &S, event_date: NaiveDate) -> Result<FormSyncReport>
where
    P: FormProvider + ?Sized,
    S: FormStore + MeetingStore + ?Sized,
{
    let runners = store.runners_for_date(event_date)?;
    let mut report = FormSyncReport {
        runners: runners.len(),
        ..Default::default()
    };

    for runner in &runners {
        let records = provider.fetch_form(&runner.selection_link)?;

        let since = match store.last_run_date(runner.selection_id) {
            Ok(last) => Some(last),
            Err(e) if e.is_not_found() => None,
            Err(e) => return Err(e),
        };

        for record in &records {
            if since.map_or(false, |last| record.race_date <= last) {
                report.skipped += 1;
                continue;
            }
            if store.insert_form(runner, record)? {
                report.inserted += 1;
            } else {
                report.skipped += 1;
            }
        }
        debug!(
            selection_id = runner.selection_id,
            fetched = records.len(),
            first_observation = since.is_none(),
            "Synced form"
        );
    }

    info!(
        %event_date,
        runners = report.runners,
        inserted = report.inserted,
        skipped = report.skipped,
        "Form sync complete"
    );
    Ok(report)
}
