use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub type Cell = Option<Value>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<Cell>>,
}

impl Table {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_json_rows<'a, I>(values: I) -> Self
    where
        I: IntoIterator<Item = &'a Value>,
    {
        let mut table = Self::empty();
        for value in values {
            match value {
                Value::Object(map) => table.push_record(map),
                Value::Null => {}
                other => {
                    let mut map = Map::new();
                    map.insert("value".to_string(), other.clone());
                    table.push_record(&map);
                }
            }
        }
        table
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Cell>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|column| column == name)
    }

    pub fn get(&self, row: usize, column: &str) -> Option<&Value> {
        let index = self.column_index(column)?;
        self.rows.get(row)?.get(index)?.as_ref()
    }

    pub fn column_values(&self, name: &str) -> Vec<Option<&Value>> {
        match self.column_index(name) {
            Some(index) => self.rows.iter().map(|row| row[index].as_ref()).collect(),
            None => vec![None; self.rows.len()],
        }
    }

    pub fn distinct_strings(&self, name: &str) -> Vec<String> {
        let mut seen = Vec::new();
        for value in self.column_values(name).into_iter().flatten() {
            let text = cell_text(value);
            if !seen.contains(&text) {
                seen.push(text);
            }
        }
        seen
    }

    pub fn push_record(&mut self, record: &Map<String, Value>) {
        let mut flat = Vec::new();
        for (key, value) in record {
            flatten_into(key.clone(), value, &mut flat);
        }
        let mut row = vec![None; self.columns.len()];
        for (key, value) in flat {
            let index = match self.column_index(&key) {
                Some(index) => index,
                None => self.add_column(key),
            };
            if index >= row.len() {
                row.resize(index + 1, None);
            }
            row[index] = value;
        }
        row.resize(self.columns.len(), None);
        self.rows.push(row);
    }

    pub fn append(&mut self, other: Table) {
        if other.columns.is_empty() {
            return;
        }
        let mapping = other
            .columns
            .iter()
            .map(|column| match self.column_index(column) {
                Some(index) => index,
                None => self.add_column(column.clone()),
            })
            .collect::<Vec<_>>();
        for source in other.rows {
            let mut row = vec![None; self.columns.len()];
            for (cell, &index) in source.into_iter().zip(&mapping) {
                row[index] = cell;
            }
            self.rows.push(row);
        }
    }

    pub fn select(&self, names: &[&str]) -> Table {
        let indices = names
            .iter()
            .filter_map(|name| self.column_index(name))
            .collect::<Vec<_>>();
        Table {
            columns: indices.iter().map(|&i| self.columns[i].clone()).collect(),
            rows: self
                .rows
                .iter()
                .map(|row| indices.iter().map(|&i| row[i].clone()).collect())
                .collect(),
        }
    }

    pub fn drop_columns(&self, names: &[&str]) -> Table {
        let keep = self
            .columns
            .iter()
            .map(String::as_str)
            .filter(|column| !names.contains(column))
            .collect::<Vec<_>>();
        self.select(&keep)
    }

    /// Partitions rows by the string value of `column`. Every key in `keys`
    /// is present in the output, holding an empty table (with this table's
    /// columns) when no row matched.
    pub fn split_by(&self, column: &str, keys: &[String]) -> BTreeMap<String, Table> {
        let mut out = keys
            .iter()
            .map(|key| (key.clone(), Table::new(self.columns.clone())))
            .collect::<BTreeMap<_, _>>();
        let Some(index) = self.column_index(column) else {
            return out;
        };
        for row in &self.rows {
            let Some(value) = row[index].as_ref() else {
                continue;
            };
            out.entry(cell_text(value))
                .or_insert_with(|| Table::new(self.columns.clone()))
                .rows
                .push(row.clone());
        }
        out
    }

    pub fn pivot_wider(&self, id_columns: &[&str], names_from: &str, values_from: &str) -> Table {
        let ids = id_columns
            .iter()
            .filter_map(|name| self.column_index(name).map(|index| (*name, index)))
            .collect::<Vec<_>>();
        let (Some(name_index), Some(value_index)) =
            (self.column_index(names_from), self.column_index(values_from))
        else {
            return self.select(id_columns);
        };

        let mut out = Table::new(ids.iter().map(|(name, _)| name.to_string()).collect());
        let mut groups: HashMap<Vec<String>, usize> = HashMap::new();
        for row in &self.rows {
            let key = ids
                .iter()
                .map(|(_, index)| row[*index].as_ref().map(cell_text).unwrap_or_default())
                .collect::<Vec<_>>();
            let target = match groups.get(&key) {
                Some(&target) => target,
                None => {
                    let mut fresh = vec![None; out.columns.len()];
                    for (slot, (_, index)) in ids.iter().enumerate() {
                        fresh[slot] = row[*index].clone();
                    }
                    out.rows.push(fresh);
                    groups.insert(key, out.rows.len() - 1);
                    out.rows.len() - 1
                }
            };
            let Some(attribute) = row[name_index].as_ref().map(cell_text) else {
                continue;
            };
            let column = match out.column_index(&attribute) {
                Some(column) => column,
                None => out.add_column(attribute),
            };
            out.rows[target][column] = row[value_index].clone();
        }
        out
    }

    /// Keeps every row of `self`; matching rows of `other` contribute their
    /// non-key columns. Columns already present on the left win.
    pub fn left_join(&self, other: &Table, on: &[&str]) -> Table {
        self.join(other, on, false)
    }

    pub fn full_join(&self, other: &Table, on: &[&str]) -> Table {
        if self.columns.is_empty() {
            return other.clone();
        }
        if other.columns.is_empty() {
            return self.clone();
        }
        self.join(other, on, true)
    }

    pub fn to_records(&self) -> Vec<Map<String, Value>> {
        self.rows
            .iter()
            .map(|row| {
                self.columns
                    .iter()
                    .zip(row)
                    .filter_map(|(column, cell)| {
                        cell.as_ref().map(|value| (column.clone(), value.clone()))
                    })
                    .collect()
            })
            .collect()
    }

    fn join(&self, other: &Table, on: &[&str], keep_unmatched_right: bool) -> Table {
        let keys = on
            .iter()
            .filter_map(|name| match (self.column_index(name), other.column_index(name)) {
                (Some(left), Some(right)) => Some((left, right)),
                _ => None,
            })
            .collect::<Vec<_>>();
        let extra = other
            .columns
            .iter()
            .enumerate()
            .filter(|(_, column)| !self.has_column(column))
            .map(|(index, _)| index)
            .collect::<Vec<_>>();

        let mut out = Table::new(self.columns.clone());
        for &index in &extra {
            out.columns.push(other.columns[index].clone());
        }

        let mut index: HashMap<Vec<String>, Vec<usize>> = HashMap::new();
        if !keys.is_empty() {
            for (row_index, row) in other.rows.iter().enumerate() {
                if let Some(key) = join_key(row, keys.iter().map(|(_, right)| *right)) {
                    index.entry(key).or_default().push(row_index);
                }
            }
        }

        let mut matched_right = vec![false; other.rows.len()];
        for row in &self.rows {
            let matches = join_key(row, keys.iter().map(|(left, _)| *left))
                .and_then(|key| index.get(&key))
                .cloned()
                .unwrap_or_default();
            if matches.is_empty() {
                let mut joined = row.clone();
                joined.resize(out.columns.len(), None);
                out.rows.push(joined);
                continue;
            }
            for right in matches {
                matched_right[right] = true;
                let mut joined = row.clone();
                joined.extend(extra.iter().map(|&i| other.rows[right][i].clone()));
                out.rows.push(joined);
            }
        }

        if keep_unmatched_right {
            for (row_index, row) in other.rows.iter().enumerate() {
                if matched_right[row_index] {
                    continue;
                }
                let mut joined = vec![None; out.columns.len()];
                for (column, cell) in other.columns.iter().zip(row) {
                    if let Some(target) = out.column_index(column) {
                        joined[target] = cell.clone();
                    }
                }
                out.rows.push(joined);
            }
        }
        out
    }

    fn add_column(&mut self, name: String) -> usize {
        self.columns.push(name);
        for row in &mut self.rows {
            row.push(None);
        }
        self.columns.len() - 1
    }
}

pub fn cell_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

fn join_key(row: &[Cell], indices: impl Iterator<Item = usize>) -> Option<Vec<String>> {
    indices
        .map(|index| row[index].as_ref().map(cell_text))
        .collect()
}

fn flatten_into(prefix: String, value: &Value, out: &mut Vec<(String, Cell)>) {
    match value {
        Value::Object(map) if !map.is_empty() => {
            for (key, nested) in map {
                flatten_into(format!("{prefix}.{key}"), nested, out);
            }
        }
        Value::Null => out.push((prefix, None)),
        other => out.push((prefix, Some(other.clone()))),
    }
}
