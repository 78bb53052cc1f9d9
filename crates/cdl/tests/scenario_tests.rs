//! End-to-end scenarios for the CDL front-end.
//!
//! Each test drives the public API (`parse` / `parse_variants` / `validate`)
//! over a complete CDL string, the way downstream tooling does.

use cdl::{parse, validate, Description, FormNode, TwinSpec};

// ============================================================================
// Concrete scenarios
// ============================================================================

#[test]
fn scenario_simple_octahedron() {
    let desc = parse("cubic[m3m]:{111}").unwrap();
    let c = desc.as_crystalline().unwrap();
    assert_eq!(c.system, "cubic");
    assert_eq!(c.point_group, "m3m");
    assert_eq!(c.forms.len(), 1);
    let form = c.forms[0].as_form().unwrap();
    assert_eq!(form.miller.as_tuple(), vec![1, 1, 1]);
    assert_eq!(form.scale, 1.0);
    assert!(c.modifications.is_empty());
    assert!(c.twin.is_none());
    assert!(c.phenomenon.is_none());
}

#[test]
fn scenario_truncated_octahedron() {
    let desc = parse("cubic[m3m]:{111}@1.0 + {100}@1.3").unwrap();
    let flat = desc.flat_forms();
    assert_eq!(flat.len(), 2);
    assert_eq!(flat[0].miller.as_tuple(), vec![1, 1, 1]);
    assert_eq!(flat[0].scale, 1.0);
    assert_eq!(flat[1].miller.as_tuple(), vec![1, 0, 0]);
    assert_eq!(flat[1].scale, 1.3);
}

#[test]
fn scenario_spinel_twin() {
    let desc = parse("cubic[m3m]:{111} | twin(spinel)").unwrap();
    let c = desc.as_crystalline().unwrap();
    assert_eq!(c.forms.len(), 1);
    assert_eq!(
        c.twin,
        Some(TwinSpec::Law {
            law: "spinel".to_string(),
            repeat: None
        })
    );
}

#[test]
fn scenario_quartz_habit_with_bravais_indices() {
    let desc = parse("trigonal[32]:{10-10}@1.0 + {10-11}@0.8").unwrap();
    let c = desc.as_crystalline().unwrap();
    assert_eq!(c.system, "trigonal");
    let flat = desc.flat_forms();
    assert_eq!(flat[0].miller.as_tuple(), vec![1, 0, -1, 0]);
    assert_eq!(flat[1].miller.as_tuple(), vec![1, 0, -1, 1]);
    for form in &flat {
        assert!(form.miller.bravais_consistent());
    }
}

#[test]
fn scenario_amorphous_opal() {
    let desc = parse("amorphous[opalescent]:{botryoidal}").unwrap();
    let a = desc.as_amorphous().unwrap();
    assert_eq!(a.subtype.as_deref(), Some("opalescent"));
    assert_eq!(a.shapes, vec!["botryoidal"]);
    assert_eq!(desc.system(), "amorphous");
}

#[test]
fn scenario_nested_growth_of_groups() {
    let desc =
        parse("trigonal[32]:({10-10}@1.0 + {10-11}@0.8) > ({10-10}@0.5 + {10-11}@0.4)").unwrap();
    let c = desc.as_crystalline().unwrap();
    assert_eq!(c.forms.len(), 1);
    match &c.forms[0] {
        FormNode::NestedGrowth { base, overgrowth } => {
            assert_eq!(base.as_group().unwrap().forms.len(), 2);
            assert_eq!(overgrowth.as_group().unwrap().forms.len(), 2);
        }
        other => panic!("expected NestedGrowth, got {other:?}"),
    }
}

#[test]
fn scenario_cluster_aggregate_over_two_forms() {
    let desc = parse("trigonal[32]:{10-10}@1.0 + {10-11}@0.8 ~ cluster[12]").unwrap();
    let c = desc.as_crystalline().unwrap();
    assert_eq!(c.forms.len(), 1);
    match &c.forms[0] {
        FormNode::Aggregate(agg) => {
            assert_eq!(agg.arrangement, "cluster");
            assert_eq!(agg.count, 12);
            assert_eq!(agg.form.as_group().unwrap().forms.len(), 2);
        }
        other => panic!("expected Aggregate, got {other:?}"),
    }
}

#[test]
fn scenario_unknown_system_diagnostic() {
    let (ok, message) = validate("invalid[xxx]:{111}");
    assert!(!ok);
    assert_eq!(message.as_deref(), Some("Unknown crystal system 'invalid'"));
}

#[test]
fn scenario_four_index_rejected_for_cubic() {
    let (ok, message) = validate("cubic[m3m]:{10-12}");
    assert!(!ok);
    assert!(message.unwrap().contains("4-index"));
}

// ============================================================================
// Universal invariants
// ============================================================================

const ACCEPTED_CORPUS: &[&str] = &[
    "cubic[m3m]:{111}",
    "cubic[m3m]:{111}@1.0 + {100}@1.3",
    "cubic[m3m]:{110}@1.0 + {211}@0.6",
    "cubic[m3m]:octahedron@1.0 + cube@1.3",
    "cubic[m3m]:core:{111}@1.0 + rim:{100}@1.3",
    "cubic[m3m]:({111}@1.0 + {100}@1.3)[phantom:3]",
    "cubic[m3m]:({111} + {100})[phantom:3] | twin(spinel)",
    "cubic[m3m]:{110} + ({111} | twin(spinel))",
    "cubic[m3m]:{111} > {110} > {100}",
    "cubic[m3m]:{111} ~ cluster[5] + {100}",
    "cubic[m3m]:{111} ~ parallel[4] @2mm [aligned:0.5]",
    "cubic[m3m]:{111} | elongate(c:1.5), taper(c:0.3)",
    "cubic[m3m]:{111} | twin(trilling,3)",
    "cubic[m3m]:{111} | twin([1,1,1],180,penetration)",
    "trigonal[32]:{10-10}@1.0 + {10-11}@0.8",
    "trigonal[32]:{10-10}@1.0 + {10-11}@0.8 ~ cluster[12]",
    "trigonal[-3m]:{10-11}@1.0[silk:dense] | phenomenon[asterism:6]",
    "hexagonal[6/mmm]:{0001} + {10-10}",
    "tetragonal[4/mmm]:prism + dipyramid@0.8",
    "orthorhombic[mmm]:{110}@1.0 | phenomenon[chatoyancy:sharp]",
    "monoclinic[2/m]:{100} + {001}",
    "triclinic[-1]:{100}",
    "amorphous[opalescent]:{botryoidal}",
    "amorphous[glassy]:{massive, conchoidal}[colour:black]",
    "amorphous:{nodular} | phenomenon[play_of_color, intensity:strong]",
    "#! Mineral: Diamond\ncubic[m3m]:{111}@1.0 + {100}@0.3",
    "@oct = {111}@1.0\ncubic[m3m]:$oct + {100}@1.3",
];

#[test]
fn every_accepted_input_validates() {
    for cdl in ACCEPTED_CORPUS {
        assert!(parse(cdl).is_ok(), "parse failed for {cdl:?}");
        let (ok, message) = validate(cdl);
        assert!(ok, "validate failed for {cdl:?}: {message:?}");
    }
}

#[test]
fn canonical_form_reparses_to_equal_tree() {
    for cdl in ACCEPTED_CORPUS {
        let desc = parse(cdl).unwrap();
        let canonical = desc.to_string();
        let reparsed = parse(&canonical)
            .unwrap_or_else(|e| panic!("canonical form of {cdl:?} failed to parse: {canonical:?}: {e}"));
        assert_eq!(desc, reparsed, "canonical round-trip differs for {cdl:?}");
    }
}

#[test]
fn bravais_invariant_holds_on_accepted_trees() {
    for cdl in ACCEPTED_CORPUS {
        let desc = parse(cdl).unwrap();
        for form in desc.flat_forms() {
            let tuple = form.miller.as_tuple();
            assert!(tuple.len() == 3 || tuple.len() == 4);
            assert!(form.miller.bravais_consistent());
        }
    }
}

#[test]
fn accepted_point_groups_belong_to_their_system() {
    for cdl in ACCEPTED_CORPUS {
        if let Description::Crystalline(c) = parse(cdl).unwrap() {
            let groups = cdl::catalog::point_groups(&c.system).unwrap();
            assert!(
                groups.contains(&c.point_group.as_str()),
                "{} not in {} groups",
                c.point_group,
                c.system
            );
        }
    }
}

#[test]
fn omitted_point_group_defaults_per_system() {
    for (system, default) in cdl::catalog::DEFAULT_POINT_GROUPS {
        let cdl = format!("{system}:{{100}}");
        let desc = parse(&cdl).unwrap();
        assert_eq!(
            desc.as_crystalline().unwrap().point_group,
            *default,
            "wrong default for {system}"
        );
    }
}

#[test]
fn named_form_substitution() {
    let desc = parse("cubic[m3m]:octahedron").unwrap();
    let form = &desc.flat_forms()[0];
    assert_eq!(form.miller.as_tuple(), vec![1, 1, 1]);
    assert_eq!(form.name.as_deref(), Some("octahedron"));
}

#[test]
fn definitions_rewrite_purely() {
    let with_def = parse("@x = {111}@1.0\ncubic[m3m]:$x").unwrap();
    let direct = parse("cubic[m3m]:{111}@1.0").unwrap();
    assert_eq!(
        with_def.as_crystalline().unwrap().forms,
        direct.as_crystalline().unwrap().forms
    );
}

#[test]
fn growth_chain_is_right_associative() {
    let desc = parse("cubic[m3m]:{111} > {110} > {100}").unwrap();
    let c = desc.as_crystalline().unwrap();
    match &c.forms[0] {
        FormNode::NestedGrowth { base, overgrowth } => {
            assert!(base.as_form().is_some());
            match overgrowth.as_ref() {
                FormNode::NestedGrowth { base, overgrowth } => {
                    assert_eq!(base.as_form().unwrap().miller.as_tuple(), vec![1, 1, 0]);
                    assert_eq!(
                        overgrowth.as_form().unwrap().miller.as_tuple(),
                        vec![1, 0, 0]
                    );
                }
                other => panic!("expected inner NestedGrowth, got {other:?}"),
            }
        }
        other => panic!("expected NestedGrowth, got {other:?}"),
    }
}

#[test]
fn rejected_corpus_never_panics() {
    for cdl in [
        "",
        "invalid{{{syntax",
        "[m3m]:{111}",
        "cubic[m3m]",
        "notasystem[m3m]:{111}",
        "cubic[6/mmm]:{111}",
        "cubic[m3m]:{11}",
        "cubic[m3m]:$nope",
        "cubic[m3m]:{111} | twin(unheard_of)",
        "cubic[m3m]:{111} ~ heap[3]",
        "amorphous[shiny]:{massive}",
    ] {
        let (ok, message) = validate(cdl);
        assert!(!ok, "expected rejection for {cdl:?}");
        assert!(message.is_some());
    }
}
