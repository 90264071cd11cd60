use super::CompositeError;
use crate::{job::Electronic, molecule::Molecule};
use indexmap::IndexMap;

/// Atoms of the complex belonging to one fragment, 0-based
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    pub atoms: Vec<usize>,
}

impl Fragment {
    pub fn contains(&self, atom: usize) -> bool {
        self.atoms.contains(&atom)
    }
}

/// A fragment read from molecule flags
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InferredFragment {
    pub name: String,
    pub atoms: Vec<usize>,
    pub electronic: Electronic,
}

fn parse_flag<T: std::str::FromStr>(
    molecule: &Molecule,
    key: String,
) -> Result<Option<T>, CompositeError> {
    match molecule.flag(&key) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| CompositeError::InvalidFlag {
                key,
                value: value.to_owned(),
            }),
    }
}

fn parse_bool(molecule: &Molecule, key: String) -> Result<bool, CompositeError> {
    match molecule.flag(&key).map(|value| value.trim().to_lowercase()) {
        None => Ok(false),
        Some(value) => match value.as_str() {
            "true" | "yes" | "1" => Ok(true),
            "false" | "no" | "0" => Ok(false),
            _ => Err(CompositeError::InvalidFlag { key, value }),
        },
    }
}

/// Group atoms by their `frag` flag.
///
/// Fragment properties come from the molecule flags `charge_<name>`,
/// `spinpol_<name>` and `uhf_<name>`. Every atom must carry a tag.
pub fn infer(molecule: &Molecule) -> Result<Vec<InferredFragment>, CompositeError> {
    let mut groups: IndexMap<&str, Vec<usize>> = IndexMap::new();

    for (index, atom) in molecule.atoms.iter().enumerate() {
        let fragment = atom.fragment().ok_or(CompositeError::UntaggedAtom(index))?;
        groups.entry(fragment).or_default().push(index);
    }

    groups
        .into_iter()
        .map(|(name, atoms)| {
            Ok(InferredFragment {
                electronic: Electronic {
                    charge: parse_flag(molecule, format!("charge_{name}"))?.unwrap_or(0),
                    spin_polarization: parse_flag(molecule, format!("spinpol_{name}"))?
                        .unwrap_or(0),
                    unrestricted: parse_bool(molecule, format!("uhf_{name}"))?,
                },
                name: name.to_owned(),
                atoms,
            })
        })
        .collect()
}
