//! Semantic validation of parsed descriptions.
//!
//! The parser guarantees shape; this module checks that every name drawn
//! from a closed vocabulary is actually in it, and that the crystallographic
//! invariants hold. Checks run in a fixed order and the first violation is
//! reported. Feature names and phenomenon kinds are deliberately not
//! checked, so that new annotations keep parsing on older tooling.

use crate::ast::{
    AmorphousDescription, CrystalForm, CrystallineDescription, Description, FormNode, TwinSpec,
};
use crate::catalog;
use crate::error::{CdlError, CdlResult};

/// Validates a description against the domain catalog, reporting the first
/// violation.
pub fn validate_description(desc: &Description) -> CdlResult<()> {
    match desc {
        Description::Crystalline(c) => validate_crystalline(c),
        Description::Amorphous(a) => validate_amorphous(a),
    }
}

fn invalid(message: String) -> CdlError {
    CdlError::Validation(message)
}

fn validate_crystalline(desc: &CrystallineDescription) -> CdlResult<()> {
    // 1. system
    if !catalog::is_crystal_system(&desc.system) || desc.system == "amorphous" {
        return Err(invalid(format!("Unknown crystal system '{}'", desc.system)));
    }

    // 2. point group
    let groups = catalog::point_groups(&desc.system).unwrap_or(&[]);
    if !groups.contains(&desc.point_group.as_str()) {
        return Err(invalid(format!(
            "Point group '{}' not valid for {} system",
            desc.point_group, desc.system
        )));
    }

    // 3. Miller indices and scales
    each_form(&desc.forms, &mut |form| validate_form(form, &desc.system))?;

    // 4. aggregates
    each_node(&desc.forms, &mut |node| {
        if let FormNode::Aggregate(agg) = node {
            if !catalog::AGGREGATE_ARRANGEMENTS.contains(&agg.arrangement.as_str()) {
                return Err(invalid(format!(
                    "Unknown aggregate arrangement '{}'",
                    agg.arrangement
                )));
            }
            if let Some(orientation) = &agg.orientation {
                if !catalog::AGGREGATE_ORIENTATIONS.contains(&orientation.as_str()) {
                    return Err(invalid(format!(
                        "Unknown aggregate orientation '{orientation}'"
                    )));
                }
            }
        }
        Ok(())
    })?;

    // 5. twins (description-level and group-level)
    if let Some(twin) = &desc.twin {
        validate_twin(twin)?;
    }
    each_node(&desc.forms, &mut |node| {
        if let FormNode::Group(group) = node {
            if let Some(twin) = &group.twin {
                validate_twin(twin)?;
            }
        }
        Ok(())
    })?;

    // 6. modifications
    for modification in &desc.modifications {
        if !catalog::MODIFICATIONS.contains(&modification.kind.as_str()) {
            return Err(invalid(format!(
                "Unknown modification '{}'",
                modification.kind
            )));
        }
    }

    Ok(())
}

fn validate_amorphous(desc: &AmorphousDescription) -> CdlResult<()> {
    if let Some(subtype) = &desc.subtype {
        if !catalog::AMORPHOUS_SUBTYPES.contains(&subtype.as_str()) {
            return Err(invalid(format!("Unknown amorphous subtype '{subtype}'")));
        }
    }
    for shape in &desc.shapes {
        if !catalog::AMORPHOUS_SHAPES.contains(&shape.as_str()) {
            return Err(invalid(format!("Unknown amorphous shape '{shape}'")));
        }
    }
    Ok(())
}

fn validate_form(form: &CrystalForm, system: &str) -> CdlResult<()> {
    if let Some(i) = form.miller.i {
        if system != "hexagonal" && system != "trigonal" {
            return Err(invalid(format!(
                "4-index Miller notation is not valid for the {system} system"
            )));
        }
        let expected = -(form.miller.h + form.miller.k);
        if i != expected {
            return Err(invalid(format!(
                "Invalid Miller-Bravais index: i should be {expected}, got {i}"
            )));
        }
    }
    if form.scale < 0.0 {
        return Err(invalid(format!(
            "Scale must be non-negative, got {}",
            form.scale
        )));
    }
    Ok(())
}

fn validate_twin(twin: &TwinSpec) -> CdlResult<()> {
    match twin {
        TwinSpec::Law { law, repeat } => {
            if !catalog::is_twin_law(law) {
                return Err(invalid(format!("Unknown twin law '{law}'")));
            }
            if let Some(repeat) = repeat {
                if *repeat < 2 {
                    return Err(invalid(format!(
                        "Twin repeat count must be at least 2, got {repeat}"
                    )));
                }
            }
            Ok(())
        }
        TwinSpec::Custom { .. } => Ok(()),
    }
}

/// Applies `check` to every node of the form tree, depth first.
fn each_node(
    nodes: &[FormNode],
    check: &mut impl FnMut(&FormNode) -> CdlResult<()>,
) -> CdlResult<()> {
    for node in nodes {
        visit(node, check)?;
    }
    Ok(())
}

fn visit(node: &FormNode, check: &mut impl FnMut(&FormNode) -> CdlResult<()>) -> CdlResult<()> {
    check(node)?;
    match node {
        FormNode::Form(_) => Ok(()),
        FormNode::Group(group) => {
            for child in &group.forms {
                visit(child, check)?;
            }
            Ok(())
        }
        FormNode::NestedGrowth { base, overgrowth } => {
            visit(base, check)?;
            visit(overgrowth, check)
        }
        FormNode::Aggregate(agg) => visit(&agg.form, check),
    }
}

/// Applies `check` to every `CrystalForm` leaf of the form tree.
fn each_form(
    nodes: &[FormNode],
    check: &mut impl FnMut(&CrystalForm) -> CdlResult<()>,
) -> CdlResult<()> {
    each_node(nodes, &mut |node| match node {
        FormNode::Form(form) => check(form),
        _ => Ok(()),
    })
}
