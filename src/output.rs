use std::collections::BTreeMap;
use std::io::{self, Write};

use serde::Serialize;
use serde_json::{Map, Value};

use crate::planner::{Outcome, ProfileTables, ProfilesResult, SampleListSamples};
use crate::table::Table;

/// Prints results as pretty JSON on stdout; tables become arrays of records
/// with missing cells omitted.
pub struct JsonOutput;

#[derive(Serialize)]
struct TableView {
    data: Vec<Map<String, Value>>,
    warnings: Vec<String>,
}

#[derive(Serialize)]
struct ProfileTablesView<'a> {
    data: BTreeMap<&'a str, Vec<Map<String, Value>>>,
    warnings: Vec<String>,
}

#[derive(Serialize)]
struct SampleListsView<'a> {
    samples: &'a BTreeMap<String, Vec<String>>,
    metadata: Vec<Map<String, Value>>,
    warnings: Vec<String>,
}

impl JsonOutput {
    pub fn print_table(table: &Table) -> io::Result<()> {
        Self::print_json(&table.to_records())
    }

    pub fn print_table_outcome(outcome: &Outcome<Table>) -> io::Result<()> {
        let view = TableView {
            data: outcome.value.to_records(),
            warnings: outcome.warnings.iter().map(ToString::to_string).collect(),
        };
        Self::print_json(&view)
    }

    pub fn print_profiles(result: &ProfilesResult) -> io::Result<()> {
        match result {
            ProfilesResult::Table(table) => Self::print_table(table),
            ProfilesResult::Raw(value) => Self::print_json(value),
        }
    }

    pub fn print_profile_tables(outcome: &Outcome<ProfileTables>) -> io::Result<()> {
        let view = ProfileTablesView {
            data: outcome
                .value
                .iter()
                .map(|(profile, table)| (profile.as_str(), table.to_records()))
                .collect(),
            warnings: outcome.warnings.iter().map(ToString::to_string).collect(),
        };
        Self::print_json(&view)
    }

    pub fn print_sample_lists(outcome: &Outcome<SampleListSamples>) -> io::Result<()> {
        let view = SampleListsView {
            samples: &outcome.value.samples,
            metadata: outcome.value.metadata.to_records(),
            warnings: outcome.warnings.iter().map(ToString::to_string).collect(),
        };
        Self::print_json(&view)
    }

    pub fn print_names(names: &[&str]) -> io::Result<()> {
        Self::print_json(&names)
    }

    fn print_json<T: Serialize + ?Sized>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}
