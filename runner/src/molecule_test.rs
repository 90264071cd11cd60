use crate::molecule::{Molecule, MoleculeError};

const WATER_DIMER: &str = "\
6
water dimer charge_A=0 charge_B=-1
O   0.000  0.000  0.000 frag=A
H   0.757  0.586  0.000 frag=A
H  -0.757  0.586  0.000 frag=A
O   0.000  0.000  3.000 frag=B
H   0.757  0.586  3.000 frag=B
H  -0.757  0.586  3.000 frag=B
";

#[test]
fn parses_header_comment_and_flags() {
    let molecule = Molecule::from_xyz(WATER_DIMER).unwrap();

    assert_eq!(molecule.len(), 6);
    assert_eq!(molecule.comment, "water dimer");
    assert_eq!(molecule.flag("charge_B"), Some("-1"));
    assert_eq!(molecule.atoms[3].fragment(), Some("B"));
    assert_eq!(molecule.atoms[1].coords, [0.757, 0.586, 0.0]);
}

#[test]
fn header_is_optional() {
    let molecule = Molecule::from_xyz("He 0 0 0\n\nNe 0 0 3.1\n").unwrap();

    assert_eq!(molecule.len(), 2);
    assert!(molecule.comment.is_empty());
    assert!(molecule.flags.is_empty());
}

#[test]
fn rejects_count_mismatch() {
    let error = Molecule::from_xyz("3\n\nHe 0 0 0\n").unwrap_err();

    assert!(matches!(error, MoleculeError::Parse { line: 1, .. }));
}

#[test]
fn rejects_bad_coordinates() {
    let error = Molecule::from_xyz("He 0 zero 0\n").unwrap_err();

    assert!(matches!(error, MoleculeError::Parse { line: 1, .. }));
}

#[test]
fn subset_keeps_atom_flags() {
    let molecule = Molecule::from_xyz(WATER_DIMER).unwrap();
    let fragment = molecule.subset(&[3, 4, 5]).unwrap();

    assert_eq!(fragment.len(), 3);
    assert!(fragment.flags.is_empty());
    assert!(fragment.atoms.iter().all(|atom| atom.fragment() == Some("B")));
    assert!(matches!(
        molecule.subset(&[6]),
        Err(MoleculeError::AtomIndex(6))
    ));
}

#[test]
fn nuclear_charge_skips_ghosts() {
    let mut molecule = Molecule::from_xyz(WATER_DIMER).unwrap();
    assert_eq!(molecule.nuclear_charge().unwrap(), 20);

    for atom in molecule.atoms.iter_mut().take(3) {
        atom.ghost = true;
    }
    assert_eq!(molecule.nuclear_charge().unwrap(), 10);
}

#[test]
fn unknown_element_is_reported() {
    let molecule = Molecule::from_xyz("Xx 0 0 0\n").unwrap();

    assert!(matches!(
        molecule.nuclear_charge(),
        Err(MoleculeError::UnknownElement(symbol)) if symbol == "Xx"
    ));
}

#[test]
fn xyz_output_reparses() {
    let molecule = Molecule::from_xyz(WATER_DIMER).unwrap();
    let again = Molecule::from_xyz(&molecule.to_xyz()).unwrap();

    assert_eq!(again.len(), molecule.len());
    assert_eq!(again.atoms[5].symbol, "H");
    assert!((again.atoms[5].coords[0] + 0.757).abs() < 1e-9);
}
