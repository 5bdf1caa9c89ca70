use std::fmt;
use std::str::FromStr;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::CbioError;

/// Level of detail requested from list endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "UPPERCASE")]
pub enum Projection {
    Id,
    Summary,
    Detailed,
    Meta,
}

impl Projection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Projection::Id => "ID",
            Projection::Summary => "SUMMARY",
            Projection::Detailed => "DETAILED",
            Projection::Meta => "META",
        }
    }

    /// DETAILED and META responses keep nested structure and are not
    /// flattened into a table.
    pub fn is_tabular(&self) -> bool {
        matches!(self, Projection::Id | Projection::Summary)
    }
}

impl fmt::Display for Projection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Projection {
    type Err = CbioError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "ID" => Ok(Projection::Id),
            "SUMMARY" => Ok(Projection::Summary),
            "DETAILED" => Ok(Projection::Detailed),
            "META" => Ok(Projection::Meta),
            _ => Err(CbioError::Configuration(format!(
                "invalid projection: {value}"
            ))),
        }
    }
}

/// Namespace of caller-supplied gene identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
pub enum GeneIdType {
    #[value(name = "entrezGeneId")]
    #[serde(rename = "entrezGeneId")]
    EntrezGeneId,
    #[value(name = "hugoGeneSymbol")]
    #[serde(rename = "hugoGeneSymbol")]
    HugoGeneSymbol,
}

impl GeneIdType {
    /// Column name carrying this identifier in gene tables.
    pub fn column(&self) -> &'static str {
        match self {
            GeneIdType::EntrezGeneId => "entrezGeneId",
            GeneIdType::HugoGeneSymbol => "hugoGeneSymbol",
        }
    }

    /// Value of the `geneIdType` query parameter of the gene fetch endpoint.
    pub fn api_value(&self) -> &'static str {
        match self {
            GeneIdType::EntrezGeneId => "ENTREZ_GENE_ID",
            GeneIdType::HugoGeneSymbol => "HUGO_GENE_SYMBOL",
        }
    }
}

impl fmt::Display for GeneIdType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClinicalDataType {
    Patient,
    Sample,
}

impl ClinicalDataType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClinicalDataType::Patient => "PATIENT",
            ClinicalDataType::Sample => "SAMPLE",
        }
    }
}

/// How the genes of a data query are chosen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GeneSelector {
    Genes { by: GeneIdType, ids: Vec<String> },
    Panel(String),
}

/// How the samples of a data query are chosen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SampleSelector {
    Ids(Vec<String>),
    SampleList(String),
    AllInStudy,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SampleProfilePair {
    pub molecular_profile_id: String,
    pub sample_id: String,
}

/// Cross product of profiles and samples, ordered by profile with samples
/// varying within. Inputs are sorted and de-duplicated first so callers'
/// ordering never leaks into request bodies or cache keys.
pub fn sample_profile_pairs(profile_ids: &[String], sample_ids: &[String]) -> Vec<SampleProfilePair> {
    let profiles = sorted_unique(profile_ids);
    let samples = sorted_unique(sample_ids);
    profiles
        .iter()
        .flat_map(|profile| {
            samples.iter().map(move |sample| SampleProfilePair {
                molecular_profile_id: profile.clone(),
                sample_id: sample.clone(),
            })
        })
        .collect()
}

pub fn sorted_unique(values: &[String]) -> Vec<String> {
    let mut out = values.to_vec();
    out.sort();
    out.dedup();
    out
}

pub fn sorted_entrez_ids(ids: &[i64]) -> Vec<i64> {
    let mut out = ids.to_vec();
    out.sort_unstable();
    out.dedup();
    out
}

/// Mutation profiles are served by dedicated endpoints and recognized by name.
pub fn is_mutation_profile(profile_id: &str) -> bool {
    profile_id.contains("mutations")
}
