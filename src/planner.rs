use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::warn;

use crate::assemble::{ParsedResponse, invoke_all_pages, invoke_and_bind, invoke_and_parse, invoke_chunked};
use crate::cache::{QueryKey, ResultCache};
use crate::client::{ApiClient, ClientSettings};
use crate::domain::{
    ClinicalDataType, GeneIdType, GeneSelector, Projection, SampleSelector, is_mutation_profile,
    sample_profile_pairs, sorted_entrez_ids, sorted_unique,
};
use crate::error::{CbioError, RemoteEmptyResult};
use crate::invoke::{Params, invoke};
use crate::table::{Table, cell_text};
use crate::transport::Transport;

const GENE_LOOKUP_CHUNK: usize = 1000;
const PATIENT_KEYS: [&str; 3] = ["uniquePatientKey", "patientId", "studyId"];
const SAMPLE_KEYS: [&str; 5] = [
    "uniqueSampleKey",
    "uniquePatientKey",
    "sampleId",
    "patientId",
    "studyId",
];

pub type ProfileTables = BTreeMap<String, Table>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outcome<T> {
    pub value: T,
    pub warnings: Vec<RemoteEmptyResult>,
}

impl<T> Outcome<T> {
    pub fn new(value: T) -> Self {
        Self {
            value,
            warnings: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProfilesResult {
    Table(Table),
    Raw(Value),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SampleListSamples {
    pub samples: BTreeMap<String, Vec<String>>,
    pub metadata: Table,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneDataQuery {
    pub study_id: String,
    pub genes: GeneSelector,
    pub molecular_profile_ids: Vec<String>,
    pub samples: SampleSelector,
    pub use_cache: bool,
}

impl GeneDataQuery {
    pub fn new(study_id: &str, genes: GeneSelector, molecular_profile_ids: &[&str]) -> Self {
        Self {
            study_id: study_id.to_string(),
            genes,
            molecular_profile_ids: molecular_profile_ids.iter().map(|id| id.to_string()).collect(),
            samples: SampleSelector::AllInStudy,
            use_cache: true,
        }
    }

    pub fn with_samples(mut self, samples: SampleSelector) -> Self {
        self.samples = samples;
        self
    }

    pub fn with_use_cache(mut self, use_cache: bool) -> Self {
        self.use_cache = use_cache;
        self
    }
}

pub struct CbioPortal<T: Transport> {
    client: ApiClient,
    transport: T,
    cache: ResultCache,
}

impl<T: Transport> CbioPortal<T> {
    pub fn new(client: ApiClient, transport: T, cache: ResultCache) -> Self {
        Self {
            client,
            transport,
            cache,
        }
    }

    pub fn connect(transport: T, settings: &ClientSettings, cache: ResultCache) -> Result<Self, CbioError> {
        let client = ApiClient::connect(&transport, settings)?;
        Ok(Self::new(client, transport, cache))
    }

    pub fn client(&self) -> &ApiClient {
        &self.client
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn cache(&self) -> &ResultCache {
        &self.cache
    }

    pub fn studies(&self) -> Result<Table, CbioError> {
        self.bind("getAllStudies", true, &Params::new())
    }

    /// Patient- and sample-level clinical attributes, one column per
    /// attribute, outer-joined on the patient keys. Results built from an
    /// error payload are not cached.
    pub fn clinical_data(&self, study_id: &str) -> Result<Outcome<Table>, CbioError> {
        let key = QueryKey::new("clinicalData")
            .client(&self.client)
            .arg("studyId", study_id);
        if let Some(table) = self.cache.get::<Table>(&key)? {
            return Ok(Outcome::new(table));
        }

        let mut outcome = Outcome::new(Table::empty());
        let mut failures = Vec::new();
        let mut halves = Vec::new();
        for kind in [ClinicalDataType::Patient, ClinicalDataType::Sample] {
            let params = Params::new()
                .with("studyId", study_id)
                .with("clinicalDataType", kind.as_str());
            let long = match self.parse("getAllClinicalDataInStudy", &params)? {
                ParsedResponse::Rows(table) => table,
                ParsedResponse::RemoteError(message) => {
                    record(
                        &mut outcome.warnings,
                        RemoteEmptyResult::new(study_id, Some(message.clone())),
                    );
                    failures.push(message);
                    Table::empty()
                }
                ParsedResponse::Empty => {
                    record(
                        &mut outcome.warnings,
                        RemoteEmptyResult::new(
                            study_id,
                            Some(format!("no {} clinical data", kind.as_str().to_lowercase())),
                        ),
                    );
                    Table::empty()
                }
            };
            halves.push(long);
        }
        if failures.len() == halves.len() {
            return Err(RemoteEmptyResult::new(study_id, failures.pop()).into());
        }

        let mut halves = halves.into_iter();
        let patients = halves
            .next()
            .unwrap_or_default()
            .pivot_wider(&PATIENT_KEYS, "clinicalAttributeId", "value");
        let samples = halves
            .next()
            .unwrap_or_default()
            .pivot_wider(&SAMPLE_KEYS, "clinicalAttributeId", "value");
        outcome.value = patients.full_join(&samples, &["patientId", "uniquePatientKey", "studyId"]);

        if failures.is_empty() {
            self.cache.put(&key, &outcome.value)?;
        }
        Ok(outcome)
    }

    pub fn molecular_profiles(
        &self,
        study_id: &str,
        projection: Projection,
    ) -> Result<ProfilesResult, CbioError> {
        let params = Params::new()
            .with("studyId", study_id)
            .with("projection", projection.as_str());
        if projection.is_tabular() {
            return self
                .bind("getAllMolecularProfilesInStudy", true, &params)
                .map(ProfilesResult::Table);
        }
        let response = invoke(
            &self.client,
            &self.transport,
            "getAllMolecularProfilesInStudy",
            true,
            &params,
        )?;
        if let ParsedResponse::RemoteError(message) = ParsedResponse::from_response(&response)? {
            return Err(RemoteEmptyResult::new(study_id, Some(message)).into());
        }
        response.json().map(ProfilesResult::Raw)
    }

    /// Mutations for each profile. The result holds exactly the requested
    /// profile IDs; profiles without rows map to empty tables.
    pub fn mutation_data(
        &self,
        molecular_profile_ids: &[String],
        entrez_gene_ids: &[i64],
        sample_ids: &[String],
    ) -> Result<Outcome<ProfileTables>, CbioError> {
        let profiles = require_profiles(molecular_profile_ids)?;
        let genes = sorted_entrez_ids(entrez_gene_ids);
        let samples = sorted_unique(sample_ids);

        let parsed = if let [profile] = profiles.as_slice() {
            let params = Params::new()
                .with("molecularProfileId", profile)
                .with("entrezGeneIds", &genes)
                .with("sampleIds", &samples);
            self.parse("fetchMutationsInMolecularProfile", &params)?
        } else {
            let params = Params::new()
                .with("entrezGeneIds", &genes)
                .with("sampleMolecularIdentifiers", sample_profile_pairs(&profiles, &samples));
            self.parse("fetchMutationsInMultipleMolecularProfiles", &params)?
        };

        let mut outcome = Outcome::new(ProfileTables::new());
        outcome.value = partition_by_profile(parsed, &profiles, &mut outcome.warnings);
        Ok(outcome)
    }

    pub fn molecular_data(
        &self,
        molecular_profile_ids: &[String],
        entrez_gene_ids: &[i64],
        sample_ids: &[String],
    ) -> Result<Outcome<ProfileTables>, CbioError> {
        let profiles = require_profiles(molecular_profile_ids)?;
        let (mutation_profiles, value_profiles): (Vec<String>, Vec<String>) = profiles
            .into_iter()
            .partition(|profile| is_mutation_profile(profile));

        let mut outcome = Outcome::new(ProfileTables::new());
        if !mutation_profiles.is_empty() {
            let mutations = self.mutation_data(&mutation_profiles, entrez_gene_ids, sample_ids)?;
            outcome.value.extend(mutations.value);
            outcome.warnings.extend(mutations.warnings);
        }
        if value_profiles.is_empty() {
            return Ok(outcome);
        }

        let genes = sorted_entrez_ids(entrez_gene_ids);
        let samples = sorted_unique(sample_ids);
        let parsed = if let [profile] = value_profiles.as_slice() {
            let params = Params::new()
                .with("molecularProfileId", profile)
                .with("entrezGeneIds", &genes)
                .with("sampleIds", &samples);
            self.parse("fetchAllMolecularDataInMolecularProfile", &params)?
        } else {
            let params = Params::new()
                .with("projection", Projection::Summary.as_str())
                .with("entrezGeneIds", &genes)
                .with(
                    "sampleMolecularIdentifiers",
                    sample_profile_pairs(&value_profiles, &samples),
                );
            self.parse("fetchMolecularDataInMultipleMolecularProfiles", &params)?
        };
        let tables = partition_by_profile(parsed, &value_profiles, &mut outcome.warnings);
        outcome.value.extend(tables);
        Ok(outcome)
    }

    pub fn get_data_by_genes(&self, query: &GeneDataQuery) -> Result<Outcome<ProfileTables>, CbioError> {
        let profiles = require_profiles(&query.molecular_profile_ids)?;
        let samples = self.resolve_samples(&query.study_id, &query.samples)?;
        let mut outcome = Outcome::new(ProfileTables::new());
        outcome.warnings = samples.warnings;
        let sample_ids = samples.value;

        let genes = self.resolve_genes(&query.genes)?;
        let entrez_ids = genes
            .column_values("entrezGeneId")
            .into_iter()
            .flatten()
            .filter_map(Value::as_i64)
            .collect::<Vec<_>>();
        let entrez_ids = sorted_entrez_ids(&entrez_ids);

        let key = QueryKey::new("getDataByGenes")
            .client(&self.client)
            .arg("studyId", &query.study_id)
            .arg("genes", gene_selector_identity(&query.genes))
            .arg("molecularProfileIds", &profiles)
            .arg("sampleIds", &sample_ids);
        if query.use_cache {
            if let Some(tables) = self.cache.get::<ProfileTables>(&key)? {
                outcome.value = tables;
                return Ok(outcome);
            }
        }

        if entrez_ids.is_empty() {
            for profile in &profiles {
                record(&mut outcome.warnings, RemoteEmptyResult::no_data(profile));
                outcome.value.insert(profile.clone(), Table::empty());
            }
            return Ok(outcome);
        }

        let data = self.molecular_data(&profiles, &entrez_ids, &sample_ids)?;
        outcome.warnings.extend(data.warnings);
        outcome.value = data
            .value
            .into_iter()
            .map(|(profile, table)| (profile, table.left_join(&genes, &["entrezGeneId"])))
            .collect();

        self.cache.put(&key, &outcome.value)?;
        Ok(outcome)
    }

    pub fn samples_in_sample_lists(
        &self,
        sample_list_ids: &[String],
    ) -> Result<Outcome<SampleListSamples>, CbioError> {
        let mut outcome = Outcome::new(SampleListSamples::default());
        for list_id in sorted_unique(sample_list_ids) {
            let params = Params::new().with("sampleListId", &list_id);
            let samples = match self.parse("getSampleList", &params)? {
                ParsedResponse::Rows(table) => {
                    let ids = table
                        .get(0, "sampleIds")
                        .and_then(Value::as_array)
                        .map(|ids| ids.iter().map(cell_text).collect::<Vec<_>>())
                        .unwrap_or_default();
                    outcome.value.metadata.append(table.drop_columns(&["sampleIds"]));
                    if ids.is_empty() {
                        record(&mut outcome.warnings, RemoteEmptyResult::no_data(&list_id));
                    }
                    ids
                }
                ParsedResponse::RemoteError(message) => {
                    record(
                        &mut outcome.warnings,
                        RemoteEmptyResult::new(&list_id, Some(message)),
                    );
                    Vec::new()
                }
                ParsedResponse::Empty => {
                    record(&mut outcome.warnings, RemoteEmptyResult::no_data(&list_id));
                    Vec::new()
                }
            };
            outcome.value.samples.insert(list_id, samples);
        }
        Ok(outcome)
    }

    pub fn sample_lists(&self, study_id: &str) -> Result<Table, CbioError> {
        self.bind(
            "getAllSampleListsInStudy",
            true,
            &Params::new().with("studyId", study_id),
        )
    }

    pub fn all_samples(&self, study_id: &str) -> Result<Table, CbioError> {
        self.bind(
            "getAllSamplesInStudy",
            true,
            &Params::new().with("studyId", study_id),
        )
    }

    pub fn gene_panels(&self) -> Result<Table, CbioError> {
        self.bind("getAllGenePanels", true, &Params::new())
    }

    /// Member genes of a panel. A panel the service does not know is an
    /// error here since there is no partial result to return.
    pub fn get_gene_panel(&self, gene_panel_id: &str) -> Result<Table, CbioError> {
        let params = Params::new().with("genePanelId", gene_panel_id);
        let parsed = invoke_and_parse(&self.client, &self.transport, "getGenePanel", true, &params)?;
        match parsed {
            ParsedResponse::Rows(table) => {
                let genes = table
                    .get(0, "genes")
                    .and_then(Value::as_array)
                    .map(|genes| Table::from_json_rows(genes))
                    .unwrap_or_default();
                if genes.is_empty() {
                    return Err(RemoteEmptyResult::no_data(gene_panel_id).into());
                }
                Ok(genes)
            }
            ParsedResponse::RemoteError(message) => {
                Err(RemoteEmptyResult::new(gene_panel_id, Some(message)).into())
            }
            ParsedResponse::Empty => Err(RemoteEmptyResult::no_data(gene_panel_id).into()),
        }
    }

    pub fn get_sample_info(
        &self,
        study_id: &str,
        sample_list_ids: &[String],
        projection: Projection,
    ) -> Result<Table, CbioError> {
        if sample_list_ids.is_empty() {
            let params = Params::new()
                .with("studyId", study_id)
                .with("projection", projection.as_str());
            return self.bind("getAllSamplesInStudy", false, &params);
        }
        let params = Params::new()
            .with("projection", projection.as_str())
            .with("sampleListIds", sorted_unique(sample_list_ids));
        self.bind("fetchSamples", false, &params)
    }

    pub fn gene_table(&self, page_size: usize, page_number: usize) -> Result<Table, CbioError> {
        let params = Params::new()
            .with("pageSize", page_size)
            .with("pageNumber", page_number);
        self.bind("getAllGenes", true, &params)
    }

    pub fn all_genes(&self, page_size: usize) -> Result<Table, CbioError> {
        invoke_all_pages(&self.client, &self.transport, "getAllGenes", &Params::new(), page_size)
    }

    pub fn query_gene_table(&self, by: GeneIdType, genes: &[String]) -> Result<Table, CbioError> {
        let params = Params::new()
            .with("geneIdType", by.api_value())
            .with("projection", Projection::Summary.as_str());
        invoke_chunked(
            &self.client,
            &self.transport,
            "fetchGenes",
            &params,
            "geneIds",
            genes,
            GENE_LOOKUP_CHUNK,
        )
    }

    fn resolve_samples(
        &self,
        study_id: &str,
        selector: &SampleSelector,
    ) -> Result<Outcome<Vec<String>>, CbioError> {
        match selector {
            SampleSelector::Ids(ids) => {
                if ids.is_empty() {
                    return Err(CbioError::Configuration(
                        "sample ID list is empty".to_string(),
                    ));
                }
                Ok(Outcome::new(sorted_unique(ids)))
            }
            SampleSelector::SampleList(list_id) => {
                let lists = self.samples_in_sample_lists(std::slice::from_ref(list_id))?;
                let ids = lists.value.samples.get(list_id).cloned().unwrap_or_default();
                Ok(Outcome {
                    value: sorted_unique(&ids),
                    warnings: lists.warnings,
                })
            }
            SampleSelector::AllInStudy => {
                let ids = self.all_samples(study_id)?.distinct_strings("sampleId");
                let mut outcome = Outcome::new(sorted_unique(&ids));
                if outcome.value.is_empty() {
                    record(&mut outcome.warnings, RemoteEmptyResult::no_data(study_id));
                }
                Ok(outcome)
            }
        }
    }

    fn resolve_genes(&self, selector: &GeneSelector) -> Result<Table, CbioError> {
        match selector {
            GeneSelector::Genes { by, ids } => {
                if ids.is_empty() {
                    return Err(CbioError::Configuration(
                        "provide genes or a gene panel".to_string(),
                    ));
                }
                self.query_gene_table(*by, ids)
            }
            GeneSelector::Panel(panel_id) => {
                if panel_id.trim().is_empty() {
                    return Err(CbioError::Configuration(
                        "provide genes or a gene panel".to_string(),
                    ));
                }
                self.get_gene_panel(panel_id)
            }
        }
    }

    fn bind(&self, operation: &str, use_cache: bool, params: &Params) -> Result<Table, CbioError> {
        invoke_and_bind(&self.client, &self.transport, operation, use_cache, params)
    }

    fn parse(&self, operation: &str, params: &Params) -> Result<ParsedResponse, CbioError> {
        invoke_and_parse(&self.client, &self.transport, operation, false, params)
    }
}

fn require_profiles(ids: &[String]) -> Result<Vec<String>, CbioError> {
    let profiles = sorted_unique(ids);
    if profiles.is_empty() {
        return Err(CbioError::Configuration(
            "provide at least one molecular profile ID".to_string(),
        ));
    }
    Ok(profiles)
}

fn partition_by_profile(
    parsed: ParsedResponse,
    profiles: &[String],
    warnings: &mut Vec<RemoteEmptyResult>,
) -> ProfileTables {
    let empty = || {
        profiles
            .iter()
            .map(|profile| (profile.clone(), Table::empty()))
            .collect::<ProfileTables>()
    };
    match parsed {
        ParsedResponse::RemoteError(message) => {
            record(warnings, RemoteEmptyResult::new(profiles.join(", "), Some(message)));
            empty()
        }
        ParsedResponse::Empty => {
            for profile in profiles {
                record(warnings, RemoteEmptyResult::no_data(profile));
            }
            empty()
        }
        ParsedResponse::Rows(table) => {
            let mut tables = match profiles {
                [only] if !table.has_column("molecularProfileId") => {
                    ProfileTables::from([(only.clone(), table)])
                }
                _ => table.split_by("molecularProfileId", profiles),
            };
            tables.retain(|profile, _| profiles.contains(profile));
            for (profile, table) in &tables {
                if table.is_empty() {
                    record(warnings, RemoteEmptyResult::no_data(profile));
                }
            }
            tables
        }
    }
}

fn gene_selector_identity(selector: &GeneSelector) -> Value {
    match selector {
        GeneSelector::Genes { by, ids } => json!({
            "by": by.column(),
            "genes": sorted_unique(ids),
        }),
        GeneSelector::Panel(panel_id) => json!({ "genePanelId": panel_id }),
    }
}

fn record(warnings: &mut Vec<RemoteEmptyResult>, warning: RemoteEmptyResult) {
    warn!(identifier = %warning.identifier, "{warning}");
    warnings.push(warning);
}
