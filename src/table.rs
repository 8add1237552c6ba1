//! Correlation of parallel SNMP tables.
//!
//! Device MIBs spread one logical record over several tables sharing the
//! same row index (name table, status table, counter table, ...). The
//! join here is index equality on the OID suffix. A data row whose index
//! is missing from the name table still gets a name: a fallback built
//! from the row's ordinal position, so output stays stable as long as the
//! device reports rows in a stable order.

use crate::snmp::{SnmpValue, TableEntry};

/// A data-table row with its resolved (or synthesized) display name.
#[derive(Clone, Debug, PartialEq)]
pub struct NamedRow {
    pub name: String,
    pub index: Vec<u64>,
    pub value: SnmpValue,
}

/// Look up the value stored under `index` in a walked table.
pub fn find<'a>(entries: &'a [TableEntry], index: &[u64]) -> Option<&'a SnmpValue> {
    entries.iter().find(|e| e.index == index).map(|e| &e.value)
}

/// Join a data table with a name table by shared index.
///
/// Every data row produces exactly one output row. Rows without a usable
/// name get `<prefix><ordinal>`; a name that was already taken by an
/// earlier row gets an ` #<ordinal>` suffix so keys stay unique within
/// one execution.
pub fn correlate(
    data: &[TableEntry],
    names: &[TableEntry],
    fallback_prefix: &str,
) -> Vec<NamedRow> {
    correlate_filtered(data, names, fallback_prefix, &[])
}

/// Like [`correlate`], but rows whose status code is in `excluded` are
/// dropped entirely: they mean "not applicable / not present" on the
/// device, so they belong neither in the output nor in any error tally.
pub fn correlate_filtered(
    data: &[TableEntry],
    names: &[TableEntry],
    fallback_prefix: &str,
    excluded: &[i64],
) -> Vec<NamedRow> {
    let mut rows = Vec::new();
    let mut taken: Vec<String> = Vec::new();

    for (ordinal, entry) in data.iter().enumerate() {
        if let Some(code) = entry.value.as_i64() {
            if excluded.contains(&code) {
                continue;
            }
        }

        let resolved = find(names, &entry.index)
            .map(|v| v.to_string())
            .filter(|s| !s.is_empty());
        let mut name = match resolved {
            Some(name) => name,
            None => format!("{}{}", fallback_prefix, ordinal),
        };
        if taken.contains(&name) {
            name = format!("{} #{}", name, ordinal);
        }
        taken.push(name.clone());

        rows.push(NamedRow {
            name,
            index: entry.index.clone(),
            value: entry.value.clone(),
        });
    }

    rows
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(index: &[u64], value: SnmpValue) -> TableEntry {
        TableEntry {
            index: index.to_vec(),
            value,
        }
    }

    #[test]
    fn test_correlate_by_index() {
        let data = [
            entry(&[1], SnmpValue::Int(30)),
            entry(&[2], SnmpValue::Int(55)),
        ];
        let names = [
            entry(&[1], SnmpValue::Str("Module 1".into())),
            entry(&[2], SnmpValue::Str("Module 2".into())),
        ];

        let rows = correlate(&data, &names, "CPU");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].name, "Module 1");
        assert_eq!(rows[1].name, "Module 2");
        assert_eq!(rows[1].value, SnmpValue::Int(55));
    }

    #[test]
    fn test_fallback_name_is_ordinal_in_data_table() {
        let data = [
            entry(&[7], SnmpValue::Int(1)),
            entry(&[9], SnmpValue::Int(1)),
        ];
        // No name for index 9: the fallback uses the row position, not the
        // index value.
        let names = [entry(&[7], SnmpValue::Str("Fan tray".into()))];

        let rows = correlate(&data, &names, "Sensor");
        assert_eq!(rows[0].name, "Fan tray");
        assert_eq!(rows[1].name, "Sensor1");
    }

    #[test]
    fn test_empty_name_falls_back() {
        let data = [entry(&[3], SnmpValue::Int(1))];
        let names = [entry(&[3], SnmpValue::Str(String::new()))];

        let rows = correlate(&data, &names, "Power");
        assert_eq!(rows[0].name, "Power0");
    }

    #[test]
    fn test_duplicate_names_stay_unique() {
        let data = [
            entry(&[1], SnmpValue::Int(1)),
            entry(&[2], SnmpValue::Int(2)),
        ];
        let names = [
            entry(&[1], SnmpValue::Str("PSU".into())),
            entry(&[2], SnmpValue::Str("PSU".into())),
        ];

        let rows = correlate(&data, &names, "Power");
        assert_eq!(rows[0].name, "PSU");
        assert_eq!(rows[1].name, "PSU #1");
    }

    #[test]
    fn test_excluded_status_codes_are_dropped() {
        let data = [
            entry(&[1], SnmpValue::Int(1)),
            entry(&[2], SnmpValue::Int(2)),
            entry(&[3], SnmpValue::Int(3)),
        ];
        let names = [
            entry(&[1], SnmpValue::Str("a".into())),
            entry(&[2], SnmpValue::Str("b".into())),
            entry(&[3], SnmpValue::Str("c".into())),
        ];

        let rows = correlate_filtered(&data, &names, "Sensor", &[2]);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].name, "a");
        assert_eq!(rows[1].name, "c");
    }

    #[test]
    fn test_find() {
        let table = [
            entry(&[1, 4], SnmpValue::Int(5)),
            entry(&[2, 4], SnmpValue::Int(6)),
        ];
        assert_eq!(find(&table, &[2, 4]), Some(&SnmpValue::Int(6)));
        assert_eq!(find(&table, &[3, 4]), None);
    }
}
