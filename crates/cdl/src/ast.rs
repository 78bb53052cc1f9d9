//! Typed description tree for CDL.
//!
//! A parsed CDL string becomes either a [`CrystallineDescription`] or an
//! [`AmorphousDescription`], wrapped in the [`Description`] enum. The form
//! tree under a crystalline description is a sum type ([`FormNode`]) covering
//! plain forms, parenthesized groups, nested growth and aggregates.
//!
//! Every type implements `Display`, producing the canonical textual form:
//! re-parsing the canonical form of an accepted description yields a
//! structurally equal tree.

use std::fmt;

/// Writes a float without a trailing `.0` when it is integral.
///
/// Keeps canonical text re-parsable and stable: `2.0` renders as `2`, which
/// parses back to the same value.
fn write_num(f: &mut fmt::Formatter<'_>, value: f64) -> fmt::Result {
    if value.fract() == 0.0 && value.is_finite() && value.abs() < 1e15 {
        write!(f, "{}", value as i64)
    } else {
        write!(f, "{value}")
    }
}

/// Miller index identifying a crystal form.
///
/// Three signed integers `(h, k, l)`, optionally extended with the redundant
/// `i` index of Miller-Bravais notation for hexagonal and trigonal systems.
/// The validator enforces `i = -(h + k)` when `i` is present.
///
/// # Examples
///
/// ```rust
/// use cdl::MillerIndex;
///
/// let octahedron = MillerIndex::new(1, 1, 1);
/// assert_eq!(octahedron.to_string(), "{111}");
///
/// let prism = MillerIndex::bravais(1, 0, -1, 0);
/// assert_eq!(prism.to_string(), "{10-10}");
/// assert_eq!(prism.as_3index(), (1, 0, 0));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MillerIndex {
    /// First index.
    pub h: i32,
    /// Second index.
    pub k: i32,
    /// Third index (fourth in Miller-Bravais notation).
    pub l: i32,
    /// Redundant third index of Miller-Bravais notation, when 4-index.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    #[cfg_attr(feature = "serde", serde(default))]
    pub i: Option<i32>,
}

impl MillerIndex {
    /// Creates a 3-index Miller notation.
    pub fn new(h: i32, k: i32, l: i32) -> Self {
        Self { h, k, l, i: None }
    }

    /// Creates a 4-index Miller-Bravais notation.
    pub fn bravais(h: i32, k: i32, i: i32, l: i32) -> Self {
        Self { h, k, l, i: Some(i) }
    }

    /// Returns the indices in written order (3 or 4 elements).
    pub fn as_tuple(&self) -> Vec<i32> {
        match self.i {
            Some(i) => vec![self.h, self.k, i, self.l],
            None => vec![self.h, self.k, self.l],
        }
    }

    /// Returns the 3-index view, dropping `i` when present.
    pub fn as_3index(&self) -> (i32, i32, i32) {
        (self.h, self.k, self.l)
    }

    /// Returns true when the Miller-Bravais constraint `i = -(h + k)` holds.
    /// A 3-index notation trivially satisfies it.
    pub fn bravais_consistent(&self) -> bool {
        match self.i {
            Some(i) => i == -(self.h + self.k),
            None => true,
        }
    }
}

impl fmt::Display for MillerIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for index in self.as_tuple() {
            write!(f, "{index}")?;
        }
        write!(f, "}}")
    }
}

/// A single value inside a feature annotation.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(untagged))]
pub enum FeatureValue {
    /// Integer value, e.g. the `3` in `phantom:3`.
    Integer(i64),
    /// Float value, e.g. `0.5`.
    Decimal(f64),
    /// Bareword value, e.g. `dense`.
    Word(String),
    /// Hyphen-joined colour chain, e.g. `pink-white-green`.
    ColorSpec(Vec<String>),
}

impl fmt::Display for FeatureValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeatureValue::Integer(n) => write!(f, "{n}"),
            // keep the decimal point so the value re-parses as a float
            FeatureValue::Decimal(n) if n.fract() == 0.0 => write!(f, "{n:.1}"),
            FeatureValue::Decimal(n) => write!(f, "{n}"),
            FeatureValue::Word(w) => write!(f, "{w}"),
            FeatureValue::ColorSpec(parts) => write!(f, "{}", parts.join("-")),
        }
    }
}

/// A feature annotation on a form, group or amorphous description.
///
/// Feature names are open-ended: unknown names parse and validate for
/// forward compatibility.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Feature {
    /// Feature name, e.g. `phantom`, `trigon`, `silk`, `colour`.
    pub name: String,
    /// Ordered values; may be empty for a bare feature name.
    pub values: Vec<FeatureValue>,
}

impl Feature {
    /// Creates a feature with the given name and values.
    pub fn new(name: impl Into<String>, values: Vec<FeatureValue>) -> Self {
        Self { name: name.into(), values }
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        for (idx, value) in self.values.iter().enumerate() {
            if idx == 0 {
                write!(f, ":{value}")?;
            } else {
                write!(f, ", {value}")?;
            }
        }
        Ok(())
    }
}

/// A parameter value inside a modification, twin or phenomenon clause.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(untagged))]
pub enum ParamValue {
    /// Numeric parameter, e.g. the `1.5` in `elongate(c:1.5)`.
    Number(f64),
    /// Bareword parameter, e.g. the `strong` in `intensity:strong`.
    Word(String),
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Number(n) => write_num(f, *n),
            ParamValue::Word(w) => write!(f, "{w}"),
        }
    }
}

/// A single crystal form: a Miller index plus a scale factor.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CrystalForm {
    /// The Miller index defining the form.
    pub miller: MillerIndex,
    /// Distance scale (default 1.0).
    pub scale: f64,
    /// Human name when reached through a named form, e.g. `octahedron`.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    #[cfg_attr(feature = "serde", serde(default))]
    pub name: Option<String>,
    /// Per-form feature annotations.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    #[cfg_attr(feature = "serde", serde(default))]
    pub features: Option<Vec<Feature>>,
    /// Form label, e.g. the `core` in `core:{111}`.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    #[cfg_attr(feature = "serde", serde(default))]
    pub label: Option<String>,
}

impl CrystalForm {
    /// Creates a form with the default scale and no annotations.
    pub fn new(miller: MillerIndex) -> Self {
        Self {
            miller,
            scale: 1.0,
            name: None,
            features: None,
            label: None,
        }
    }

    /// Creates a form with an explicit scale.
    pub fn with_scale(miller: MillerIndex, scale: f64) -> Self {
        Self { scale, ..Self::new(miller) }
    }
}

impl fmt::Display for CrystalForm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(label) = &self.label {
            write!(f, "{label}:")?;
        }
        match &self.name {
            Some(name) => write!(f, "{name}")?,
            None => write!(f, "{}", self.miller)?,
        }
        if self.scale != 1.0 {
            write!(f, "@")?;
            write_num(f, self.scale)?;
        }
        if let Some(features) = &self.features {
            write_features(f, features)?;
        }
        Ok(())
    }
}

fn write_features(f: &mut fmt::Formatter<'_>, features: &[Feature]) -> fmt::Result {
    write!(f, "[")?;
    for (idx, feature) in features.iter().enumerate() {
        if idx > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{feature}")?;
    }
    write!(f, "]")
}

/// A parenthesized group of forms with optional shared features, label and
/// group-level twin.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FormGroup {
    /// Member form nodes, in written order.
    pub forms: Vec<FormNode>,
    /// Features shared by every member.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    #[cfg_attr(feature = "serde", serde(default))]
    pub features: Option<Vec<Feature>>,
    /// Group label.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    #[cfg_attr(feature = "serde", serde(default))]
    pub label: Option<String>,
    /// Twin applying only to this group.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    #[cfg_attr(feature = "serde", serde(default))]
    pub twin: Option<TwinSpec>,
}

impl FormGroup {
    /// Creates a bare group around the given nodes.
    pub fn new(forms: Vec<FormNode>) -> Self {
        Self {
            forms,
            features: None,
            label: None,
            twin: None,
        }
    }
}

impl fmt::Display for FormGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(label) = &self.label {
            write!(f, "{label}:")?;
        }
        write!(f, "(")?;
        for (idx, form) in self.forms.iter().enumerate() {
            if idx > 0 {
                write!(f, " + ")?;
            }
            write!(f, "{form}")?;
        }
        write!(f, ")")?;
        if let Some(features) = &self.features {
            write_features(f, features)?;
        }
        if let Some(twin) = &self.twin {
            write!(f, " | {twin}")?;
        }
        Ok(())
    }
}

/// An aggregate of crystal individuals with a spatial arrangement.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AggregateSpec {
    /// The form node being aggregated.
    pub form: Box<FormNode>,
    /// Arrangement name, e.g. `cluster`, `druse`, `radial`.
    pub arrangement: String,
    /// Number of individuals.
    pub count: u32,
    /// Optional spacing, kept verbatim (e.g. `2mm`).
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    #[cfg_attr(feature = "serde", serde(default))]
    pub spacing: Option<String>,
    /// Optional orientation name, e.g. `aligned`.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    #[cfg_attr(feature = "serde", serde(default))]
    pub orientation: Option<String>,
    /// Optional numeric orientation parameter.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    #[cfg_attr(feature = "serde", serde(default))]
    pub orientation_param: Option<f64>,
}

impl fmt::Display for AggregateSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ~ {}[{}]", self.form, self.arrangement, self.count)?;
        if let Some(spacing) = &self.spacing {
            write!(f, " @{spacing}")?;
        }
        if let Some(orientation) = &self.orientation {
            write!(f, " [{orientation}")?;
            if let Some(param) = self.orientation_param {
                write!(f, ":")?;
                write_num(f, param)?;
            }
            write!(f, "]")?;
        }
        Ok(())
    }
}

/// A node of the form tree.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "type", rename_all = "snake_case"))]
pub enum FormNode {
    /// A single crystal form.
    Form(CrystalForm),
    /// A parenthesized group.
    Group(FormGroup),
    /// Nested growth `base > overgrowth`; the textual `>` chain is
    /// right-associative, so `a > b > c` becomes `a > (b > c)`.
    NestedGrowth {
        /// The inner (earlier) crystal.
        base: Box<FormNode>,
        /// The outer (later) crystal grown over the base.
        overgrowth: Box<FormNode>,
    },
    /// An aggregate of individuals.
    Aggregate(AggregateSpec),
}

impl FormNode {
    /// Creates a nested growth node.
    pub fn nested(base: FormNode, overgrowth: FormNode) -> Self {
        FormNode::NestedGrowth {
            base: Box::new(base),
            overgrowth: Box::new(overgrowth),
        }
    }

    /// Returns the inner crystal form when this node is a plain form.
    pub fn as_form(&self) -> Option<&CrystalForm> {
        match self {
            FormNode::Form(form) => Some(form),
            _ => None,
        }
    }

    /// Returns the inner group when this node is a group.
    pub fn as_group(&self) -> Option<&FormGroup> {
        match self {
            FormNode::Group(group) => Some(group),
            _ => None,
        }
    }

    fn flatten_into(&self, parent_features: Option<&[Feature]>, out: &mut Vec<CrystalForm>) {
        match self {
            FormNode::Form(form) => {
                let mut flat = form.clone();
                if let Some(parent) = parent_features {
                    let mut merged: Vec<Feature> = parent.to_vec();
                    if let Some(own) = &form.features {
                        merged.extend(own.iter().cloned());
                    }
                    flat.features = Some(merged);
                }
                out.push(flat);
            }
            FormNode::Group(group) => {
                let mut combined: Vec<Feature> = parent_features.unwrap_or(&[]).to_vec();
                if let Some(shared) = &group.features {
                    combined.extend(shared.iter().cloned());
                }
                let combined = if combined.is_empty() { None } else { Some(combined) };
                for child in &group.forms {
                    child.flatten_into(combined.as_deref(), out);
                }
            }
            FormNode::NestedGrowth { base, overgrowth } => {
                base.flatten_into(parent_features, out);
                overgrowth.flatten_into(parent_features, out);
            }
            FormNode::Aggregate(agg) => agg.form.flatten_into(parent_features, out),
        }
    }
}

impl fmt::Display for FormNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FormNode::Form(form) => write!(f, "{form}"),
            FormNode::Group(group) => write!(f, "{group}"),
            FormNode::NestedGrowth { base, overgrowth } => write!(f, "{base} > {overgrowth}"),
            FormNode::Aggregate(agg) => write!(f, "{agg}"),
        }
    }
}

/// Type of a twin intergrowth.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum TwinType {
    /// Individuals share a composition plane.
    Contact,
    /// Individuals interpenetrate.
    Penetration,
    /// Repeated twinning around an axis.
    Cyclic,
}

impl TwinType {
    /// Parses a twin type keyword.
    pub fn from_keyword(word: &str) -> Option<Self> {
        match word {
            "contact" => Some(TwinType::Contact),
            "penetration" => Some(TwinType::Penetration),
            "cyclic" => Some(TwinType::Cyclic),
            _ => None,
        }
    }
}

impl fmt::Display for TwinType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TwinType::Contact => write!(f, "contact"),
            TwinType::Penetration => write!(f, "penetration"),
            TwinType::Cyclic => write!(f, "cyclic"),
        }
    }
}

/// A twin specification: either a named law or a custom axis/angle pair.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum TwinSpec {
    /// A named twin law, e.g. `twin(spinel)` or `twin(trilling,3)`.
    Law {
        /// The law name.
        law: String,
        /// Optional repeat count for cyclic laws.
        #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
        #[cfg_attr(feature = "serde", serde(default))]
        repeat: Option<u32>,
    },
    /// A custom twin: `twin([h,k,l], angle [, type])`.
    Custom {
        /// Twin axis as an integer vector.
        axis: [i32; 3],
        /// Rotation angle in degrees.
        angle: f64,
        /// Optional twin type.
        #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
        #[cfg_attr(feature = "serde", serde(default))]
        twin_type: Option<TwinType>,
    },
}

impl TwinSpec {
    /// Creates a named-law twin with no repeat count.
    pub fn law(name: impl Into<String>) -> Self {
        TwinSpec::Law { law: name.into(), repeat: None }
    }
}

impl fmt::Display for TwinSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TwinSpec::Law { law, repeat: None } => write!(f, "twin({law})"),
            TwinSpec::Law { law, repeat: Some(n) } => write!(f, "twin({law},{n})"),
            TwinSpec::Custom { axis, angle, twin_type } => {
                write!(f, "twin([{},{},{}],", axis[0], axis[1], axis[2])?;
                write_num(f, *angle)?;
                if let Some(t) = twin_type {
                    write!(f, ",{t}")?;
                }
                write!(f, ")")
            }
        }
    }
}

/// A morphological modification, e.g. `elongate(c:1.5)`.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Modification {
    /// Modification kind (`elongate`, `truncate`, `taper`, `flatten`, `bevel`).
    pub kind: String,
    /// Ordered `name:value` parameter pairs.
    pub params: Vec<(String, ParamValue)>,
}

impl fmt::Display for Modification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.kind)?;
        for (idx, (name, value)) in self.params.iter().enumerate() {
            if idx > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{name}:{value}")?;
        }
        write!(f, ")")
    }
}

/// A single phenomenon parameter; a bare identifier carries no value.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PhenomenonParam {
    /// Parameter name.
    pub name: String,
    /// Parameter value, absent for flag-style parameters.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    #[cfg_attr(feature = "serde", serde(default))]
    pub value: Option<ParamValue>,
}

/// An optical phenomenon, e.g. `phenomenon[asterism:6, intensity:strong]`.
///
/// Phenomenon kinds are open-ended: unknown kinds parse and validate for
/// forward compatibility.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PhenomenonSpec {
    /// Phenomenon kind, e.g. `asterism`, `chatoyancy`.
    pub kind: String,
    /// Ordered parameters.
    pub params: Vec<PhenomenonParam>,
}

impl PhenomenonSpec {
    /// Looks up a parameter value by name.
    pub fn param(&self, name: &str) -> Option<&ParamValue> {
        self.params
            .iter()
            .find(|p| p.name == name)
            .and_then(|p| p.value.as_ref())
    }
}

impl fmt::Display for PhenomenonSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "phenomenon[{}", self.kind)?;
        for param in &self.params {
            write!(f, ", {}", param.name)?;
            if let Some(value) = &param.value {
                write!(f, ":{value}")?;
            }
        }
        write!(f, "]")
    }
}

/// The body of a named definition, recognised at definition time.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum DefinitionBody {
    /// A form expression fragment.
    Forms(Vec<FormNode>),
    /// A feature list fragment.
    Features(Vec<Feature>),
    /// A modifier list fragment.
    Modifiers(Vec<Modification>),
}

impl fmt::Display for DefinitionBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DefinitionBody::Forms(forms) => {
                for (idx, form) in forms.iter().enumerate() {
                    if idx > 0 {
                        write!(f, " + ")?;
                    }
                    write!(f, "{form}")?;
                }
                Ok(())
            }
            DefinitionBody::Features(features) => {
                for (idx, feature) in features.iter().enumerate() {
                    if idx > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{feature}")?;
                }
                Ok(())
            }
            DefinitionBody::Modifiers(mods) => {
                for (idx, m) in mods.iter().enumerate() {
                    if idx > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{m}")?;
                }
                Ok(())
            }
        }
    }
}

/// A named definition from the document prelude: `@name = expression`.
///
/// References are resolved by textual substitution at parse time, so `$name`
/// never appears in the final tree; the definition itself is kept for
/// round-tripping and tooling.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Definition {
    /// The bareword name following `@`.
    pub name: String,
    /// The recognised expression fragment.
    pub body: DefinitionBody,
}

impl fmt::Display for Definition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{} = {}", self.name, self.body)
    }
}

/// A complete crystalline description.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CrystallineDescription {
    /// Crystal system name, e.g. `cubic`.
    pub system: String,
    /// Hermann-Mauguin point group, explicit or the system default.
    pub point_group: String,
    /// Top-level form nodes, in written order.
    pub forms: Vec<FormNode>,
    /// Morphological modifications, in written order.
    pub modifications: Vec<Modification>,
    /// Optional twin specification.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    #[cfg_attr(feature = "serde", serde(default))]
    pub twin: Option<TwinSpec>,
    /// Optional optical phenomenon.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    #[cfg_attr(feature = "serde", serde(default))]
    pub phenomenon: Option<PhenomenonSpec>,
    /// Doc comment bodies (`#!` lines) in document order.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    #[cfg_attr(feature = "serde", serde(default))]
    pub doc_comments: Option<Vec<String>>,
    /// Named definitions from the prelude.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    #[cfg_attr(feature = "serde", serde(default))]
    pub definitions: Option<Vec<Definition>>,
}

impl CrystallineDescription {
    /// Flattens the form tree into its `CrystalForm` leaves, merging group
    /// features into each child (group features first).
    pub fn flat_forms(&self) -> Vec<CrystalForm> {
        let mut out = Vec::new();
        for node in &self.forms {
            node.flatten_into(None, &mut out);
        }
        out
    }
}

impl fmt::Display for CrystallineDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_prelude(f, &self.doc_comments, &self.definitions)?;
        write!(f, "{}[{}]:", self.system, self.point_group)?;
        for (idx, form) in self.forms.iter().enumerate() {
            if idx > 0 {
                write!(f, " + ")?;
            }
            write!(f, "{form}")?;
        }
        if !self.modifications.is_empty() {
            write!(f, " | ")?;
            for (idx, m) in self.modifications.iter().enumerate() {
                if idx > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{m}")?;
            }
        }
        if let Some(twin) = &self.twin {
            write!(f, " | {twin}")?;
        }
        if let Some(phenomenon) = &self.phenomenon {
            write!(f, " | {phenomenon}")?;
        }
        Ok(())
    }
}

/// A complete description of an amorphous material.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AmorphousDescription {
    /// Amorphous subtype, absent when unspecified.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    #[cfg_attr(feature = "serde", serde(default))]
    pub subtype: Option<String>,
    /// External shape descriptors, in written order.
    pub shapes: Vec<String>,
    /// Optional feature annotations.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    #[cfg_attr(feature = "serde", serde(default))]
    pub features: Option<Vec<Feature>>,
    /// Optional optical phenomenon.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    #[cfg_attr(feature = "serde", serde(default))]
    pub phenomenon: Option<PhenomenonSpec>,
    /// Doc comment bodies (`#!` lines) in document order.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    #[cfg_attr(feature = "serde", serde(default))]
    pub doc_comments: Option<Vec<String>>,
    /// Named definitions from the prelude.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    #[cfg_attr(feature = "serde", serde(default))]
    pub definitions: Option<Vec<Definition>>,
}

impl AmorphousDescription {
    /// Always reports `amorphous`.
    pub fn system(&self) -> &'static str {
        "amorphous"
    }

    /// Amorphous materials have no crystal forms.
    pub fn flat_forms(&self) -> Vec<CrystalForm> {
        Vec::new()
    }
}

impl fmt::Display for AmorphousDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_prelude(f, &self.doc_comments, &self.definitions)?;
        write!(f, "amorphous")?;
        if let Some(subtype) = &self.subtype {
            write!(f, "[{subtype}]")?;
        }
        write!(f, ":{{{}}}", self.shapes.join(", "))?;
        if let Some(features) = &self.features {
            write_features(f, features)?;
        }
        if let Some(phenomenon) = &self.phenomenon {
            write!(f, " | {phenomenon}")?;
        }
        Ok(())
    }
}

fn write_prelude(
    f: &mut fmt::Formatter<'_>,
    doc_comments: &Option<Vec<String>>,
    definitions: &Option<Vec<Definition>>,
) -> fmt::Result {
    if let Some(comments) = doc_comments {
        for comment in comments {
            writeln!(f, "#! {comment}")?;
        }
    }
    if let Some(defs) = definitions {
        for def in defs {
            writeln!(f, "{def}")?;
        }
    }
    Ok(())
}

/// A parsed CDL document: crystalline or amorphous.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(untagged))]
pub enum Description {
    /// A crystalline material.
    Crystalline(CrystallineDescription),
    /// An amorphous material.
    Amorphous(AmorphousDescription),
}

impl Description {
    /// The system name: the crystal system, or `amorphous`.
    pub fn system(&self) -> &str {
        match self {
            Description::Crystalline(c) => &c.system,
            Description::Amorphous(a) => a.system(),
        }
    }

    /// Doc comment bodies attached to the description, if any.
    pub fn doc_comments(&self) -> Option<&[String]> {
        match self {
            Description::Crystalline(c) => c.doc_comments.as_deref(),
            Description::Amorphous(a) => a.doc_comments.as_deref(),
        }
    }

    /// Named definitions from the prelude, if any.
    pub fn definitions(&self) -> Option<&[Definition]> {
        match self {
            Description::Crystalline(c) => c.definitions.as_deref(),
            Description::Amorphous(a) => a.definitions.as_deref(),
        }
    }

    /// Flattened `CrystalForm` leaves; empty for amorphous materials.
    pub fn flat_forms(&self) -> Vec<CrystalForm> {
        match self {
            Description::Crystalline(c) => c.flat_forms(),
            Description::Amorphous(a) => a.flat_forms(),
        }
    }

    /// Returns the crystalline description, if this is one.
    pub fn as_crystalline(&self) -> Option<&CrystallineDescription> {
        match self {
            Description::Crystalline(c) => Some(c),
            Description::Amorphous(_) => None,
        }
    }

    /// Returns the amorphous description, if this is one.
    pub fn as_amorphous(&self) -> Option<&AmorphousDescription> {
        match self {
            Description::Crystalline(_) => None,
            Description::Amorphous(a) => Some(a),
        }
    }
}

impl fmt::Display for Description {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Description::Crystalline(c) => write!(f, "{c}"),
            Description::Amorphous(a) => write!(f, "{a}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_miller_display_3index() {
        assert_eq!(MillerIndex::new(1, 1, 1).to_string(), "{111}");
        assert_eq!(MillerIndex::new(1, 0, 0).to_string(), "{100}");
    }

    #[test]
    fn test_miller_display_4index() {
        assert_eq!(MillerIndex::bravais(1, 0, -1, 1).to_string(), "{10-11}");
        assert_eq!(MillerIndex::bravais(0, 0, 0, 1).to_string(), "{0001}");
    }

    #[test]
    fn test_miller_as_tuple() {
        assert_eq!(MillerIndex::new(1, 1, 1).as_tuple(), vec![1, 1, 1]);
        assert_eq!(
            MillerIndex::bravais(1, 0, -1, 1).as_tuple(),
            vec![1, 0, -1, 1]
        );
    }

    #[test]
    fn test_miller_bravais_consistency() {
        assert!(MillerIndex::bravais(1, 0, -1, 1).bravais_consistent());
        assert!(!MillerIndex::bravais(1, 0, 0, 1).bravais_consistent());
        assert!(MillerIndex::new(5, 5, 5).bravais_consistent());
    }

    #[test]
    fn test_form_display_default_scale_omitted() {
        let form = CrystalForm::new(MillerIndex::new(1, 1, 1));
        assert_eq!(form.to_string(), "{111}");
    }

    #[test]
    fn test_form_display_with_scale() {
        let form = CrystalForm::with_scale(MillerIndex::new(1, 0, 0), 1.3);
        assert_eq!(form.to_string(), "{100}@1.3");
    }

    #[test]
    fn test_form_display_integral_scale_has_no_decimal() {
        let form = CrystalForm::with_scale(MillerIndex::new(1, 0, 0), 2.0);
        assert_eq!(form.to_string(), "{100}@2");
    }

    #[test]
    fn test_named_form_displays_bareword() {
        let mut form = CrystalForm::new(MillerIndex::new(1, 1, 1));
        form.name = Some("octahedron".to_string());
        assert_eq!(form.to_string(), "octahedron");
    }

    #[test]
    fn test_labeled_form_display() {
        let mut form = CrystalForm::with_scale(MillerIndex::new(1, 1, 1), 0.8);
        form.label = Some("core".to_string());
        assert_eq!(form.to_string(), "core:{111}@0.8");
    }

    #[test]
    fn test_feature_display() {
        let feature = Feature::new("trigon", vec![FeatureValue::Word("dense".to_string())]);
        assert_eq!(feature.to_string(), "trigon:dense");

        let feature = Feature::new(
            "phantom",
            vec![
                FeatureValue::Integer(3),
                FeatureValue::Word("white".to_string()),
            ],
        );
        assert_eq!(feature.to_string(), "phantom:3, white");
    }

    #[test]
    fn test_color_spec_display() {
        let feature = Feature::new(
            "colour",
            vec![FeatureValue::ColorSpec(vec![
                "pink".to_string(),
                "white".to_string(),
                "green".to_string(),
            ])],
        );
        assert_eq!(feature.to_string(), "colour:pink-white-green");
    }

    #[test]
    fn test_decimal_feature_value_keeps_decimal_point() {
        assert_eq!(FeatureValue::Decimal(3.0).to_string(), "3.0");
        assert_eq!(FeatureValue::Decimal(0.5).to_string(), "0.5");
    }

    #[test]
    fn test_group_display() {
        let group = FormGroup::new(vec![
            FormNode::Form(CrystalForm::new(MillerIndex::new(1, 1, 1))),
            FormNode::Form(CrystalForm::new(MillerIndex::new(1, 0, 0))),
        ]);
        assert_eq!(group.to_string(), "({111} + {100})");
    }

    #[test]
    fn test_group_display_with_twin() {
        let mut group = FormGroup::new(vec![FormNode::Form(CrystalForm::new(
            MillerIndex::new(1, 1, 1),
        ))]);
        group.twin = Some(TwinSpec::law("spinel"));
        assert_eq!(group.to_string(), "({111}) | twin(spinel)");
    }

    #[test]
    fn test_nested_growth_display() {
        let node = FormNode::nested(
            FormNode::Form(CrystalForm::new(MillerIndex::new(1, 1, 1))),
            FormNode::Form(CrystalForm::new(MillerIndex::new(1, 0, 0))),
        );
        assert_eq!(node.to_string(), "{111} > {100}");
    }

    #[test]
    fn test_aggregate_display() {
        let agg = AggregateSpec {
            form: Box::new(FormNode::Form(CrystalForm::new(MillerIndex::new(1, 1, 1)))),
            arrangement: "cluster".to_string(),
            count: 12,
            spacing: Some("2mm".to_string()),
            orientation: Some("aligned".to_string()),
            orientation_param: Some(0.5),
        };
        assert_eq!(agg.to_string(), "{111} ~ cluster[12] @2mm [aligned:0.5]");
    }

    #[test]
    fn test_twin_display() {
        assert_eq!(TwinSpec::law("spinel").to_string(), "twin(spinel)");
        let twin = TwinSpec::Law {
            law: "trilling".to_string(),
            repeat: Some(3),
        };
        assert_eq!(twin.to_string(), "twin(trilling,3)");
        let twin = TwinSpec::Custom {
            axis: [1, 1, 1],
            angle: 180.0,
            twin_type: Some(TwinType::Penetration),
        };
        assert_eq!(twin.to_string(), "twin([1,1,1],180,penetration)");
    }

    #[test]
    fn test_modification_display() {
        let m = Modification {
            kind: "elongate".to_string(),
            params: vec![("c".to_string(), ParamValue::Number(1.5))],
        };
        assert_eq!(m.to_string(), "elongate(c:1.5)");
    }

    #[test]
    fn test_phenomenon_display() {
        let p = PhenomenonSpec {
            kind: "asterism".to_string(),
            params: vec![PhenomenonParam {
                name: "value".to_string(),
                value: Some(ParamValue::Number(6.0)),
            }],
        };
        assert_eq!(p.to_string(), "phenomenon[asterism, value:6]");
    }

    #[test]
    fn test_flat_forms_merges_group_features() {
        let group = FormGroup {
            forms: vec![
                FormNode::Form(CrystalForm {
                    miller: MillerIndex::new(1, 1, 1),
                    scale: 1.0,
                    name: None,
                    features: Some(vec![Feature::new(
                        "trigon",
                        vec![FeatureValue::Word("dense".to_string())],
                    )]),
                    label: None,
                }),
                FormNode::Form(CrystalForm::new(MillerIndex::new(1, 0, 0))),
            ],
            features: Some(vec![Feature::new("phantom", vec![FeatureValue::Integer(3)])]),
            label: None,
            twin: None,
        };
        let desc = CrystallineDescription {
            system: "cubic".to_string(),
            point_group: "m3m".to_string(),
            forms: vec![FormNode::Group(group)],
            modifications: vec![],
            twin: None,
            phenomenon: None,
            doc_comments: None,
            definitions: None,
        };
        let flat = desc.flat_forms();
        assert_eq!(flat.len(), 2);
        // group feature first, own feature after
        let names: Vec<&str> = flat[0]
            .features
            .as_ref()
            .unwrap()
            .iter()
            .map(|f| f.name.as_str())
            .collect();
        assert_eq!(names, ["phantom", "trigon"]);
        let names: Vec<&str> = flat[1]
            .features
            .as_ref()
            .unwrap()
            .iter()
            .map(|f| f.name.as_str())
            .collect();
        assert_eq!(names, ["phantom"]);
    }

    #[test]
    fn test_description_display() {
        let desc = CrystallineDescription {
            system: "cubic".to_string(),
            point_group: "m3m".to_string(),
            forms: vec![
                FormNode::Form(CrystalForm::new(MillerIndex::new(1, 1, 1))),
                FormNode::Form(CrystalForm::with_scale(MillerIndex::new(1, 0, 0), 1.3)),
            ],
            modifications: vec![],
            twin: Some(TwinSpec::law("spinel")),
            phenomenon: None,
            doc_comments: None,
            definitions: None,
        };
        assert_eq!(
            desc.to_string(),
            "cubic[m3m]:{111} + {100}@1.3 | twin(spinel)"
        );
    }

    #[cfg(feature = "serde")]
    mod serde_shape {
        use crate::parse;

        #[test]
        fn test_miller_serializes_as_hkl() {
            let desc = parse("cubic[m3m]:{111}").unwrap();
            let json = serde_json::to_value(&desc).unwrap();
            assert_eq!(json["forms"][0]["type"], "form");
            assert_eq!(json["forms"][0]["miller"]["h"], 1);
            assert_eq!(json["forms"][0]["miller"]["k"], 1);
            assert_eq!(json["forms"][0]["miller"]["l"], 1);
            // absent i is omitted entirely
            assert!(json["forms"][0]["miller"].get("i").is_none());
        }

        #[test]
        fn test_bravais_i_is_present_when_four_index() {
            let desc = parse("trigonal[32]:{10-11}").unwrap();
            let json = serde_json::to_value(&desc).unwrap();
            assert_eq!(json["forms"][0]["miller"]["i"], -1);
        }

        #[test]
        fn test_none_fields_are_omitted() {
            let desc = parse("cubic[m3m]:{111}").unwrap();
            let json = serde_json::to_value(&desc).unwrap();
            assert!(json["forms"][0].get("name").is_none());
            assert!(json["forms"][0].get("label").is_none());
            assert!(json.get("twin").is_none());
        }

        #[test]
        fn test_nested_growth_tag() {
            let desc = parse("cubic[m3m]:{111} > {100}").unwrap();
            let json = serde_json::to_value(&desc).unwrap();
            assert_eq!(json["forms"][0]["type"], "nested_growth");
            assert_eq!(json["forms"][0]["base"]["type"], "form");
        }

        #[test]
        fn test_json_round_trip() {
            let desc = parse("trigonal[32]:{10-10}@1.0 + {10-11}@0.8 ~ cluster[12]").unwrap();
            let json = serde_json::to_string(&desc).unwrap();
            let back: crate::Description = serde_json::from_str(&json).unwrap();
            assert_eq!(desc, back);
        }
    }

    #[test]
    fn test_amorphous_display() {
        let desc = AmorphousDescription {
            subtype: Some("opalescent".to_string()),
            shapes: vec!["botryoidal".to_string()],
            features: None,
            phenomenon: None,
            doc_comments: None,
            definitions: None,
        };
        assert_eq!(desc.to_string(), "amorphous[opalescent]:{botryoidal}");
        assert_eq!(desc.system(), "amorphous");
        assert!(desc.flat_forms().is_empty());
    }
}
