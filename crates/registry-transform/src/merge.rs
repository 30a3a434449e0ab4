//! Pure merge functions applied by the staging store's write path.
//!
//! The caller picks the function per namespace: partner sightings
//! accumulate, everything else is replaced wholesale. Both take and
//! return raw serialized bytes so the store never needs per-namespace
//! branching.

use registry_core::model::PartnerRecord;

/// Outcome of a merge. Errors mean the bytes did not decode; the
/// staging store promotes that to a fatal corruption error for the key.
pub type MergeResult = std::result::Result<Vec<u8>, serde_json::Error>;

/// Signature every namespace merge must satisfy: combine the currently
/// staged value (absent on first sighting) with one incoming row.
pub type MergeFn = fn(Option<&[u8]>, &[u8]) -> MergeResult;

/// Appends one partner sighting to the staged sequence, preserving
/// first-observation order. Applying this N times in file order yields
/// the N sightings in that order, however the calls are batched.
pub fn merge_partners(existing: Option<&[u8]>, incoming: &[u8]) -> MergeResult {
    let mut all: Vec<PartnerRecord> = match existing {
        Some(bytes) => serde_json::from_slice(bytes)?,
        None => Vec::new(),
    };
    let one: PartnerRecord = serde_json::from_slice(incoming)?;
    all.push(one);
    serde_json::to_vec(&all)
}

/// Degenerate merge for singleton facets: the incoming row wins
/// wholesale. No field-level merging.
pub fn replace(_existing: Option<&[u8]>, incoming: &[u8]) -> MergeResult {
    Ok(incoming.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use registry_core::model::PartnerRecord;

    fn partner(name: &str, country: Option<i32>) -> PartnerRecord {
        PartnerRecord {
            nome_socio: Some(name.to_string()),
            codigo_pais: country,
            ..Default::default()
        }
    }

    fn to_bytes<T: serde::Serialize>(value: &T) -> Vec<u8> {
        serde_json::to_vec(value).unwrap()
    }

    #[test]
    fn merge_into_empty_one_and_two_partners() {
        let incoming = partner("Nome da pessoa 3", Some(3));
        for existing in [
            Vec::new(),
            vec![partner("Nome da pessoa 1", Some(1))],
            vec![
                partner("Nome da pessoa 1", Some(1)),
                partner("Nome da pessoa 2", None),
            ],
        ] {
            let staged = if existing.is_empty() {
                None
            } else {
                Some(to_bytes(&existing))
            };
            let merged =
                merge_partners(staged.as_deref(), &to_bytes(&incoming)).unwrap();
            let got: Vec<PartnerRecord> = serde_json::from_slice(&merged).unwrap();
            assert_eq!(got.len(), existing.len() + 1);
            assert_eq!(got[..existing.len()], existing[..]);
            assert_eq!(*got.last().unwrap(), incoming);
        }
    }

    #[test]
    fn repeated_application_is_order_stable() {
        let sightings: Vec<PartnerRecord> = (0..20)
            .map(|i| partner(&format!("Nome {i}"), Some(i)))
            .collect();
        // split the same sequence into uneven batches; the staged result
        // must be identical to one-by-one application
        for chunk in [1usize, 3, 7, 20] {
            let mut staged: Option<Vec<u8>> = None;
            for batch in sightings.chunks(chunk) {
                for p in batch {
                    staged =
                        Some(merge_partners(staged.as_deref(), &to_bytes(p)).unwrap());
                }
            }
            let got: Vec<PartnerRecord> =
                serde_json::from_slice(&staged.unwrap()).unwrap();
            assert_eq!(got, sightings);
        }
    }

    #[test]
    fn corrupt_existing_bytes_fail() {
        let incoming = to_bytes(&partner("Nome", None));
        assert!(merge_partners(Some(b"not json"), &incoming).is_err());
    }

    #[test]
    fn replace_always_takes_incoming() {
        let old = br#"{"opcao_pelo_simples":true}"#;
        let new = br#"{"opcao_pelo_simples":false}"#;
        let merged = replace(Some(old.as_slice()), new.as_slice()).unwrap();
        assert_eq!(merged, new);
        let first = replace(None, new.as_slice()).unwrap();
        assert_eq!(first, new);
    }
}
