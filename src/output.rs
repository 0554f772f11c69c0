use std::io::{self, Write};

use serde::Serialize;

use crate::domain::Organism;
use crate::export::Coverage;
use crate::progress::{JobProgress, JobSummary};

#[derive(Debug, Serialize)]
pub struct OrganismListing<'a> {
    pub organisms: &'a [Organism],
}

#[derive(Debug, Serialize)]
pub struct ExportReport<'a> {
    pub organism: &'a str,
    pub path: Option<&'a str>,
    pub rows: usize,
    pub coverage: &'a Coverage,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_organisms(organisms: &[Organism]) -> io::Result<()> {
        Self::print_json(&OrganismListing { organisms })
    }

    pub fn print_organism(organism: &Organism) -> io::Result<()> {
        Self::print_json(organism)
    }

    pub fn print_summary(summary: &JobSummary) -> io::Result<()> {
        Self::print_json(summary)
    }

    pub fn print_progress(progress: &JobProgress) -> io::Result<()> {
        Self::print_json(progress)
    }

    pub fn print_export(report: &ExportReport<'_>) -> io::Result<()> {
        Self::print_json(report)
    }

    fn print_json<T: Serialize + ?Sized>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}
