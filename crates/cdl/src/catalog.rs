//! Static domain tables for CDL.
//!
//! Crystal systems, their point groups, named form shorthands, twin laws and
//! the amorphous/aggregate vocabularies all live here as process-wide
//! read-only data. The parser consults these tables to resolve named forms,
//! and the validator consults them to reject descriptions that name things
//! outside the recognised vocabulary.

use crate::ast::MillerIndex;

/// The seven crystalline systems plus `amorphous`.
pub const CRYSTAL_SYSTEMS: &[&str] = &[
    "cubic",
    "hexagonal",
    "trigonal",
    "tetragonal",
    "orthorhombic",
    "monoclinic",
    "triclinic",
    "amorphous",
];

/// Hermann-Mauguin point groups, per crystalline system.
pub const POINT_GROUPS: &[(&str, &[&str])] = &[
    ("triclinic", &["1", "-1"]),
    ("monoclinic", &["2", "m", "2/m"]),
    ("orthorhombic", &["222", "mm2", "mmm"]),
    ("tetragonal", &["4", "-4", "4/m", "422", "4mm", "-42m", "4/mmm"]),
    ("trigonal", &["3", "-3", "32", "3m", "-3m"]),
    ("hexagonal", &["6", "-6", "6/m", "622", "6mm", "-6m2", "6/mmm"]),
    ("cubic", &["23", "m3", "432", "-43m", "m3m"]),
];

/// Highest-symmetry (holohedral) point group, per crystalline system.
pub const DEFAULT_POINT_GROUPS: &[(&str, &str)] = &[
    ("triclinic", "-1"),
    ("monoclinic", "2/m"),
    ("orthorhombic", "mmm"),
    ("tetragonal", "4/mmm"),
    ("trigonal", "-3m"),
    ("hexagonal", "6/mmm"),
    ("cubic", "m3m"),
];

/// Recognised twin laws.
pub const TWIN_LAWS: &[&str] = &[
    "spinel",
    "spinel_law",
    "iron_cross",
    "fluorite",
    "brazil",
    "dauphine",
    "japan",
    "carlsbad",
    "baveno",
    "manebach",
    "albite",
    "pericline",
    "gypsum_swallow",
    "staurolite_60",
    "staurolite_90",
    "trilling",
    "sixling",
];

/// Recognised amorphous subtypes.
pub const AMORPHOUS_SUBTYPES: &[&str] =
    &["opalescent", "glassy", "waxy", "resinous", "cryptocrystalline"];

/// Recognised external shapes for amorphous materials.
pub const AMORPHOUS_SHAPES: &[&str] = &[
    "massive",
    "botryoidal",
    "reniform",
    "stalactitic",
    "mammillary",
    "nodular",
    "conchoidal",
];

/// Recognised aggregate arrangements.
pub const AGGREGATE_ARRANGEMENTS: &[&str] =
    &["parallel", "random", "radial", "epitaxial", "druse", "cluster"];

/// Recognised aggregate orientations.
pub const AGGREGATE_ORIENTATIONS: &[&str] = &["aligned", "random", "planar", "spherical"];

/// Recognised morphological modification kinds (a closed set).
pub const MODIFICATIONS: &[&str] = &["elongate", "truncate", "taper", "flatten", "bevel"];

/// Named forms of the cubic family: bareword to `(h, k, l)`.
pub const CUBIC_FORMS: &[(&str, [i32; 3])] = &[
    ("cube", [1, 0, 0]),
    ("octahedron", [1, 1, 1]),
    ("dodecahedron", [1, 1, 0]),
    ("trapezohedron", [2, 1, 1]),
    ("trisoctahedron", [2, 2, 1]),
    ("tetrahexahedron", [2, 1, 0]),
    ("hexoctahedron", [3, 2, 1]),
];

/// Named forms of the hexagonal/trigonal family: bareword to `(h, k, i, l)`.
pub const HEXAGONAL_FORMS: &[(&str, [i32; 4])] = &[
    ("prism", [1, 0, -1, 0]),
    ("prism_1", [1, 0, -1, 0]),
    ("prism_2", [1, 1, -2, 0]),
    ("basal", [0, 0, 0, 1]),
    ("pinacoid", [0, 0, 0, 1]),
    ("rhombohedron", [1, 0, -1, 1]),
    ("rhombohedron_r", [1, 0, -1, 1]),
    ("rhombohedron_z", [0, 1, -1, 1]),
    ("pyramid", [1, 0, -1, 1]),
    ("dipyramid", [1, 0, -1, 1]),
    ("scalenohedron", [2, 1, -3, 1]),
];

/// Named forms of the tetragonal family: bareword to `(h, k, l)`.
pub const TETRAGONAL_FORMS: &[(&str, [i32; 3])] = &[
    ("prism", [1, 0, 0]),
    ("prism_1", [1, 0, 0]),
    ("prism_2", [1, 1, 0]),
    ("pyramid", [1, 0, 1]),
    ("dipyramid", [1, 0, 1]),
    ("bipyramid", [1, 0, 1]),
];

/// Returns true if `name` is a recognised system (including `amorphous`).
pub fn is_crystal_system(name: &str) -> bool {
    CRYSTAL_SYSTEMS.contains(&name)
}

/// Point groups permitted for a crystalline system.
pub fn point_groups(system: &str) -> Option<&'static [&'static str]> {
    POINT_GROUPS
        .iter()
        .find(|(s, _)| *s == system)
        .map(|(_, groups)| *groups)
}

/// Default point group for a crystalline system.
pub fn default_point_group(system: &str) -> Option<&'static str> {
    DEFAULT_POINT_GROUPS
        .iter()
        .find(|(s, _)| *s == system)
        .map(|(_, pg)| *pg)
}

/// Resolves a named form within the family of the given system.
///
/// The same bareword maps to different indices in different families:
/// `prism` is {10-10} under a hexagonal or trigonal system but {100} under a
/// tetragonal one. Systems outside the three families have no named forms.
/// An empty system falls back to the first family that knows the name, which
/// lets definition bodies be recorded before any system is in scope.
pub fn named_form(system: &str, name: &str) -> Option<MillerIndex> {
    match system {
        "cubic" => cubic_form(name),
        "hexagonal" | "trigonal" => hexagonal_form(name),
        "tetragonal" => tetragonal_form(name),
        "" => cubic_form(name)
            .or_else(|| hexagonal_form(name))
            .or_else(|| tetragonal_form(name)),
        _ => None,
    }
}

fn cubic_form(name: &str) -> Option<MillerIndex> {
    CUBIC_FORMS
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, [h, k, l])| MillerIndex::new(*h, *k, *l))
}

fn hexagonal_form(name: &str) -> Option<MillerIndex> {
    HEXAGONAL_FORMS
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, [h, k, i, l])| MillerIndex::bravais(*h, *k, *i, *l))
}

fn tetragonal_form(name: &str) -> Option<MillerIndex> {
    TETRAGONAL_FORMS
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, [h, k, l])| MillerIndex::new(*h, *k, *l))
}

/// Returns true if `law` is a recognised twin law.
pub fn is_twin_law(law: &str) -> bool {
    TWIN_LAWS.contains(&law)
}
