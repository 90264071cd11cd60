pub mod elements;

use indexmap::IndexMap;
use itertools::Itertools;
use std::{fs, path::Path};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MoleculeError {
    #[error("Failed to read molecule file")]
    Io(#[from] std::io::Error),
    #[error("Malformed xyz on line {line}: {reason}")]
    Parse { line: usize, reason: String },
    #[error("Unknown element {0}")]
    UnknownElement(String),
    #[error("Atom index {0} is out of range")]
    AtomIndex(usize),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Atom {
    pub symbol: String,
    pub coords: [f64; 3],
    /// per-atom `key=value` flags, e.g. `frag=Donor`
    pub flags: IndexMap<String, String>,
    /// basis functions only, no nucleus and no electrons
    pub ghost: bool,
}

impl Atom {
    pub fn new(symbol: impl Into<String>, coords: [f64; 3]) -> Self {
        Self {
            symbol: symbol.into(),
            coords,
            flags: IndexMap::new(),
            ghost: false,
        }
    }

    pub fn fragment(&self) -> Option<&str> {
        self.flags.get("frag").map(String::as_str)
    }

    pub fn atomic_number(&self) -> Result<u32, MoleculeError> {
        elements::atomic_number(&self.symbol)
            .ok_or_else(|| MoleculeError::UnknownElement(self.symbol.clone()))
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Molecule {
    pub atoms: Vec<Atom>,
    pub comment: String,
    /// molecule level `key=value` flags from the xyz comment line
    pub flags: IndexMap<String, String>,
}

fn parse_flag(token: &str) -> Option<(String, String)> {
    token
        .split_once('=')
        .filter(|(key, _)| !key.is_empty())
        .map(|(key, value)| (key.to_owned(), value.to_owned()))
}

impl Molecule {
    pub fn new(atoms: Vec<Atom>) -> Self {
        Self {
            atoms,
            ..Default::default()
        }
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, MoleculeError> {
        Self::from_xyz(&fs::read_to_string(path)?)
    }

    /// Parse an xyz document.
    ///
    /// The atom count line is optional. When present, the following line is
    /// the comment line and its `key=value` tokens become molecule flags.
    /// Trailing `key=value` tokens on atom lines become atom flags.
    pub fn from_xyz(text: &str) -> Result<Self, MoleculeError> {
        let mut lines = text.lines().enumerate().peekable();
        let mut molecule = Molecule::default();
        let mut expected = None;

        let header = lines
            .peek()
            .and_then(|(_, first)| first.trim().parse::<usize>().ok());

        if let Some(count) = header {
            expected = Some(count);
            lines.next();

            if let Some((_, comment)) = lines.next() {
                let mut words = Vec::new();
                for token in comment.split_whitespace() {
                    match parse_flag(token) {
                        Some((key, value)) => {
                            molecule.flags.insert(key, value);
                        }
                        None => words.push(token),
                    }
                }
                molecule.comment = words.join(" ");
            }
        }

        for (number, line) in lines {
            let tokens = line.split_whitespace().collect_vec();

            if tokens.is_empty() {
                continue;
            }

            if tokens.len() < 4 {
                return Err(MoleculeError::Parse {
                    line: number + 1,
                    reason: format!("expected `symbol x y z`, found {} fields", tokens.len()),
                });
            }

            let mut coords = [0.0; 3];
            for (axis, token) in tokens[1..4].iter().enumerate() {
                coords[axis] = token.parse().map_err(|_| MoleculeError::Parse {
                    line: number + 1,
                    reason: format!("`{token}` is not a coordinate"),
                })?;
            }

            let mut atom = Atom::new(tokens[0], coords);
            atom.flags.extend(tokens[4..].iter().filter_map(|token| parse_flag(token)));
            molecule.atoms.push(atom);
        }

        if let Some(count) = expected {
            if count != molecule.atoms.len() {
                return Err(MoleculeError::Parse {
                    line: 1,
                    reason: format!(
                        "header declares {count} atoms but {} were read",
                        molecule.atoms.len()
                    ),
                });
            }
        }

        Ok(molecule)
    }

    pub fn to_xyz(&self) -> String {
        let mut text = format!("{}\n{}\n", self.atoms.len(), self.comment);

        for atom in &self.atoms {
            text.push_str(&format!(
                "{:<3} {:>16.10} {:>16.10} {:>16.10}\n",
                atom.symbol, atom.coords[0], atom.coords[1], atom.coords[2]
            ));
        }

        text
    }

    pub fn len(&self) -> usize {
        self.atoms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.atoms.is_empty()
    }

    pub fn flag(&self, key: &str) -> Option<&str> {
        self.flags.get(key).map(String::as_str)
    }

    /// new molecule holding only the atoms at `indices` (0-based)
    pub fn subset(&self, indices: &[usize]) -> Result<Molecule, MoleculeError> {
        let atoms = indices
            .iter()
            .map(|&index| {
                self.atoms
                    .get(index)
                    .cloned()
                    .ok_or(MoleculeError::AtomIndex(index))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Molecule {
            atoms,
            comment: self.comment.clone(),
            flags: IndexMap::new(),
        })
    }

    /// sum of nuclear charges of all real (non-ghost) atoms
    pub fn nuclear_charge(&self) -> Result<u32, MoleculeError> {
        self.atoms
            .iter()
            .filter(|atom| !atom.ghost)
            .map(Atom::atomic_number)
            .sum()
    }
}
