//! CDL parser implementation using nom.
//!
//! Parsing happens in four passes, mirroring the document structure:
//!
//! 1. a comment pass strips `#` line comments and `/* ... */` block comments
//!    and collects `#!` doc-comment bodies;
//! 2. a definition pass extracts `@name = expression` lines and substitutes
//!    `$name` references textually (with a depth cap against cycles);
//! 3. a variant pass expands `( a ; b )` alternatives into separate
//!    candidate strings;
//! 4. the grammar pass proper, one nom function per production, with the
//!    precedence ladder `@` scale < `[...]` features < `>` growth (right
//!    associative) < `~` aggregate < `+` addition < `|` modifier clauses.

use nom::{
    branch::alt,
    bytes::complete::{tag, take_while, take_while1},
    character::complete::{alpha1, char, digit1, multispace0},
    combinator::{all_consuming, map, map_res, opt, recognize},
    error::{context, ErrorKind, ParseError as NomParseError, VerboseError, VerboseErrorKind},
    multi::{many0, separated_list1},
    sequence::{delimited, pair, preceded, tuple},
    Err as NomErr, IResult,
};

use crate::ast::{
    AggregateSpec, AmorphousDescription, CrystalForm, CrystallineDescription, Definition,
    DefinitionBody, Description, Feature, FeatureValue, FormGroup, FormNode, MillerIndex,
    Modification, ParamValue, PhenomenonParam, PhenomenonSpec, TwinSpec, TwinType,
};
use crate::catalog;
use crate::error::{CdlError, CdlResult};

type PResult<'a, T> = IResult<&'a str, T, VerboseError<&'a str>>;

/// Substitution rounds allowed while resolving `$name` references.
const MAX_REFERENCE_DEPTH: usize = 8;

/// Upper bound on the number of variant alternatives one document may expand to.
const MAX_VARIANTS: usize = 64;

// ============================================================================
// Public entry points (crate-internal; the crate facade adds validation)
// ============================================================================

/// Parses a CDL document into a description, without semantic validation.
///
/// When the document contains variant alternatives the first alternative of
/// each variant group is selected.
pub(crate) fn parse_document(text: &str) -> CdlResult<Description> {
    let prepared = prepare(text)?;
    let mut desc = parse_body(&prepared.variants[0])?;
    attach_prelude(&mut desc, &prepared);
    Ok(desc)
}

/// Parses a CDL document into one description per variant alternative.
pub(crate) fn parse_document_variants(text: &str) -> CdlResult<Vec<Description>> {
    let prepared = prepare(text)?;
    let mut out = Vec::with_capacity(prepared.variants.len());
    for variant in &prepared.variants {
        let mut desc = parse_body(variant)?;
        attach_prelude(&mut desc, &prepared);
        out.push(desc);
    }
    Ok(out)
}

struct Prepared {
    variants: Vec<String>,
    doc_comments: Vec<String>,
    definitions: Vec<Definition>,
}

fn prepare(text: &str) -> CdlResult<Prepared> {
    let (cleaned, doc_comments) = strip_comments(text);
    if cleaned.trim().is_empty() {
        return Err(CdlError::EmptyInput);
    }

    let (body, raw_definitions) = extract_definitions(&cleaned);
    let body = resolve_references(body.trim(), &raw_definitions)?;
    if body.trim().is_empty() {
        return Err(CdlError::EmptyInput);
    }

    let definitions = parse_definition_bodies(&raw_definitions)?;
    let variants = expand_variants(body.trim())?;
    Ok(Prepared {
        variants,
        doc_comments,
        definitions,
    })
}

fn attach_prelude(desc: &mut Description, prepared: &Prepared) {
    let doc_comments = (!prepared.doc_comments.is_empty()).then(|| prepared.doc_comments.clone());
    let definitions = (!prepared.definitions.is_empty()).then(|| prepared.definitions.clone());
    match desc {
        Description::Crystalline(c) => {
            c.doc_comments = doc_comments;
            c.definitions = definitions;
        }
        Description::Amorphous(a) => {
            a.doc_comments = doc_comments;
            a.definitions = definitions;
        }
    }
}

fn parse_body(body: &str) -> CdlResult<Description> {
    match all_consuming(document)(body) {
        Ok((_, desc)) => Ok(desc),
        Err(NomErr::Error(e)) | Err(NomErr::Failure(e)) => Err(syntax_error(body, e)),
        Err(NomErr::Incomplete(_)) => Err(CdlError::Syntax {
            position: body.len(),
            message: "incomplete input".to_string(),
        }),
    }
}

// ============================================================================
// Comment stripping
// ============================================================================

/// Removes comments from the raw text, collecting `#!` doc-comment bodies.
fn strip_comments(text: &str) -> (String, Vec<String>) {
    let mut doc_comments = Vec::new();
    let mut kept: Vec<&str> = Vec::new();
    for line in text.split('\n') {
        if let Some(body) = line.trim_start().strip_prefix("#!") {
            doc_comments.push(body.trim().to_string());
        } else {
            kept.push(line);
        }
    }
    let text = kept.join("\n");

    let text = strip_block_comments(&text);

    // '#' to end of line
    let mut out = String::new();
    for (idx, line) in text.split('\n').enumerate() {
        if idx > 0 {
            out.push('\n');
        }
        out.push_str(line.split('#').next().unwrap_or(""));
    }
    (out, doc_comments)
}

/// Removes matched `/* ... */` pairs; an unterminated opener is left in
/// place so the grammar reports it.
fn strip_block_comments(text: &str) -> String {
    let mut out = String::new();
    let mut rest = text;
    while let Some(open) = rest.find("/*") {
        match rest[open..].find("*/") {
            Some(close) => {
                out.push_str(&rest[..open]);
                rest = &rest[open + close + 2..];
            }
            None => break,
        }
    }
    out.push_str(rest);
    out
}

// ============================================================================
// Definitions and references
// ============================================================================

/// Splits `@name = expression` lines out of the document body.
fn extract_definitions(text: &str) -> (String, Vec<(String, String)>) {
    let mut definitions = Vec::new();
    let mut body_lines: Vec<&str> = Vec::new();
    for line in text.split('\n') {
        let stripped = line.trim();
        if let Some(def) = stripped.strip_prefix('@').and_then(split_definition) {
            definitions.push(def);
        } else {
            body_lines.push(line);
        }
    }
    (body_lines.join("\n"), definitions)
}

/// Parses `name = body` after the leading `@`; returns `None` when the line
/// is not definition-shaped (it then stays in the body and fails there).
fn split_definition(rest: &str) -> Option<(String, String)> {
    let name_len = rest
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .unwrap_or(rest.len());
    if name_len == 0 {
        return None;
    }
    let name = &rest[..name_len];
    let after = rest[name_len..].trim_start();
    let body = after.strip_prefix('=')?.trim();
    if body.is_empty() {
        return None;
    }
    Some((name.to_string(), body.to_string()))
}

/// Substitutes `$name` references until none remain, up to the depth cap.
fn resolve_references(text: &str, definitions: &[(String, String)]) -> CdlResult<String> {
    let mut current = text.to_string();
    for _ in 0..MAX_REFERENCE_DEPTH {
        if !current.contains('$') {
            return Ok(current);
        }
        let (next, changed) = substitute_refs(&current, definitions);
        if !changed {
            return match first_reference(&next) {
                Some(name) => Err(CdlError::UndefinedReference(name)),
                None => Ok(next),
            };
        }
        current = next;
    }
    if current.contains('$') {
        Err(CdlError::ReferenceDepth)
    } else {
        Ok(current)
    }
}

/// One substitution pass; replacement text is not rescanned within the pass.
fn substitute_refs(text: &str, definitions: &[(String, String)]) -> (String, bool) {
    let mut out = String::with_capacity(text.len());
    let mut changed = false;
    let mut rest = text;
    while let Some(pos) = rest.find('$') {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];
        let name_len = after
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
            .unwrap_or(after.len());
        let name = &after[..name_len];
        match definitions.iter().find(|(n, _)| n == name) {
            Some((_, body)) if name_len > 0 => {
                out.push_str(body);
                changed = true;
            }
            _ => {
                out.push('$');
                out.push_str(name);
            }
        }
        rest = &after[name_len..];
    }
    out.push_str(rest);
    (out, changed)
}

fn first_reference(text: &str) -> Option<String> {
    let pos = text.find('$')?;
    let after = &text[pos + 1..];
    let name_len = after
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .unwrap_or(after.len());
    (name_len > 0).then(|| after[..name_len].to_string())
}

/// Re-parses each definition body into its recognised fragment kind.
fn parse_definition_bodies(raw: &[(String, String)]) -> CdlResult<Vec<Definition>> {
    let mut out = Vec::with_capacity(raw.len());
    for (name, body) in raw {
        let resolved = resolve_references(body, raw)?;
        let body = parse_fragment(&resolved)?;
        out.push(Definition {
            name: name.clone(),
            body,
        });
    }
    Ok(out)
}

/// Recognises a definition body as a form expression, a feature list or a
/// modifier list, tried in that order.
fn parse_fragment(body: &str) -> CdlResult<DefinitionBody> {
    if let Ok((rest, forms)) = form_expr(body, "") {
        if rest.trim().is_empty() {
            return Ok(DefinitionBody::Forms(forms));
        }
    }
    if let Ok((rest, features)) = bare_feature_list(body) {
        if rest.trim().is_empty() {
            return Ok(DefinitionBody::Features(features));
        }
    }
    if let Ok((rest, mods)) = modification_list(body) {
        if rest.trim().is_empty() {
            return Ok(DefinitionBody::Modifiers(mods));
        }
    }
    Err(CdlError::Syntax {
        position: 0,
        message: format!("unrecognised definition body '{body}'"),
    })
}

// ============================================================================
// Variant expansion
// ============================================================================

/// Expands `( a ; b )` variant groups into one string per alternative.
fn expand_variants(text: &str) -> CdlResult<Vec<String>> {
    let mut out = Vec::new();
    expand_into(text, &mut out)?;
    Ok(out)
}

fn expand_into(text: &str, out: &mut Vec<String>) -> CdlResult<()> {
    match find_variant_group(text) {
        None => {
            if out.len() >= MAX_VARIANTS {
                return Err(CdlError::VariantLimit(MAX_VARIANTS));
            }
            out.push(text.to_string());
            Ok(())
        }
        Some((open, close, splits)) => {
            let mut starts = vec![open + 1];
            starts.extend(splits.iter().map(|s| s + 1));
            let mut ends: Vec<usize> = splits;
            ends.push(close);
            for (start, end) in starts.into_iter().zip(ends) {
                let alternative = text[start..end].trim();
                let candidate =
                    format!("{}({}){}", &text[..open], alternative, &text[close + 1..]);
                expand_into(&candidate, out)?;
            }
            Ok(())
        }
    }
}

/// Finds the first parenthesized group containing `;` at its own level.
/// Returns byte offsets of the opening paren, the closing paren and every
/// top-level `;` inside it. Unbalanced parens return `None` and are reported
/// by the grammar instead.
fn find_variant_group(text: &str) -> Option<(usize, usize, Vec<usize>)> {
    let mut stack: Vec<usize> = Vec::new();
    let mut iter = text.char_indices();
    while let Some((idx, ch)) = iter.next() {
        match ch {
            '(' => stack.push(idx),
            ')' => {
                stack.pop();
            }
            ';' if !stack.is_empty() => {
                let open = *stack.last()?;
                let mut splits = vec![idx];
                let mut level = 0usize;
                for (j, c) in iter.by_ref() {
                    match c {
                        '(' => level += 1,
                        ')' if level == 0 => return Some((open, j, splits)),
                        ')' => level -= 1,
                        ';' if level == 0 => splits.push(j),
                        _ => {}
                    }
                }
                return None;
            }
            _ => {}
        }
    }
    None
}

// ============================================================================
// Error mapping
// ============================================================================

/// Converts a nom verbose error into a positioned syntax failure.
fn syntax_error(input: &str, err: VerboseError<&str>) -> CdlError {
    let position = err
        .errors
        .first()
        .map(|(rest, _)| input.len() - rest.len())
        .unwrap_or(0);
    let mut expected: Vec<String> = Vec::new();
    for (_, kind) in &err.errors {
        let item = match kind {
            VerboseErrorKind::Context(c) => (*c).to_string(),
            VerboseErrorKind::Char(c) => format!("'{c}'"),
            VerboseErrorKind::Nom(_) => continue,
        };
        if !expected.contains(&item) {
            expected.push(item);
        }
    }
    expected.truncate(3);
    let message = if expected.is_empty() {
        let snippet: String = input[position..].chars().take(20).collect();
        if snippet.is_empty() {
            "unexpected end of input".to_string()
        } else {
            format!("unexpected input at '{snippet}'")
        }
    } else {
        format!("expected {}", expected.join(" or "))
    };
    CdlError::Syntax { position, message }
}

/// Unrecoverable parse failure carrying an expectation message.
fn failure<'a, T>(input: &'a str, expected: &'static str) -> PResult<'a, T> {
    Err(NomErr::Failure(VerboseError {
        errors: vec![(input, VerboseErrorKind::Context(expected))],
    }))
}

/// Recoverable mismatch used to back out of a speculative branch.
fn backtrack<T>(input: &str) -> PResult<'_, T> {
    Err(NomErr::Error(VerboseError::from_error_kind(
        input,
        ErrorKind::Tag,
    )))
}

// ============================================================================
// Lexical helpers
// ============================================================================

fn ws(input: &str) -> PResult<&str> {
    multispace0(input)
}

fn identifier(input: &str) -> PResult<&str> {
    recognize(pair(
        alt((alpha1, tag("_"))),
        take_while(|c: char| c.is_ascii_alphanumeric() || c == '_'),
    ))(input)
}

/// Point-group symbols may contain digits, `/` and a leading `-`
/// (e.g. `m3m`, `-3m`, `6/mmm`, `-42m`).
fn point_group_symbol(input: &str) -> PResult<&str> {
    take_while1(|c: char| c.is_ascii_alphanumeric() || c == '/' || c == '-')(input)
}

fn number(input: &str) -> PResult<f64> {
    map_res(
        recognize(tuple((
            opt(char('-')),
            digit1,
            opt(pair(char('.'), digit1)),
        ))),
        str::parse::<f64>,
    )(input)
}

fn int32(input: &str) -> PResult<i32> {
    map_res(recognize(pair(opt(char('-')), digit1)), str::parse::<i32>)(input)
}

fn count_u32(input: &str) -> PResult<u32> {
    map_res(digit1, str::parse::<u32>)(input)
}

// ============================================================================
// Top-level document
// ============================================================================

fn document(input: &str) -> PResult<Description> {
    let (input, _) = ws(input)?;
    let (input, system) = context("crystal system", identifier)(input)?;
    let system = system.to_lowercase();
    let (input, desc) = if system == "amorphous" {
        let (input, amorphous) = amorphous_tail(input)?;
        (input, Description::Amorphous(amorphous))
    } else {
        let (input, crystalline) = crystalline_tail(input, &system)?;
        (input, Description::Crystalline(crystalline))
    };
    let (input, _) = ws(input)?;
    Ok((input, desc))
}

fn crystalline_tail<'a>(input: &'a str, system: &str) -> PResult<'a, CrystallineDescription> {
    let (input, explicit_pg) = opt(delimited(
        preceded(ws, char('[')),
        delimited(ws, point_group_symbol, ws),
        char(']'),
    ))(input)?;
    let point_group = match explicit_pg {
        Some(pg) => pg.to_string(),
        None => catalog::default_point_group(system)
            .unwrap_or_default()
            .to_string(),
    };

    let (input, _) = context("':' before the form list", preceded(ws, char(':')))(input)?;
    let (input, forms) = form_expr(input, system)?;

    let mut modifications = Vec::new();
    let mut twin = None;
    let mut phenomenon = None;
    let mut input = input;
    while let Ok((after_pipe, _)) = preceded(ws, char::<_, VerboseError<&str>>('|'))(input) {
        let (after_pipe, _) = ws(after_pipe)?;
        let Ok((after_word, word)) = identifier(after_pipe) else {
            return failure(after_pipe, "modification, twin or phenomenon clause");
        };
        match word.to_lowercase().as_str() {
            "twin" => {
                if twin.is_some() {
                    return failure(after_pipe, "at most one twin clause");
                }
                let (rest, spec) = twin_body(after_word)?;
                twin = Some(spec);
                input = rest;
            }
            "phenomenon" => {
                let (rest, spec) = phenomenon_body(after_word)?;
                phenomenon = Some(spec);
                input = rest;
                break;
            }
            _ => {
                let (rest, mods) = modification_list(after_pipe)?;
                modifications.extend(mods);
                input = rest;
            }
        }
    }

    Ok((
        input,
        CrystallineDescription {
            system: system.to_string(),
            point_group,
            forms,
            modifications,
            twin,
            phenomenon,
            doc_comments: None,
            definitions: None,
        },
    ))
}

fn amorphous_tail(input: &str) -> PResult<AmorphousDescription> {
    let (input, subtype) = opt(delimited(
        preceded(ws, char('[')),
        delimited(ws, identifier, ws),
        char(']'),
    ))(input)?;
    let (input, _) = context("':' before the shape list", preceded(ws, char(':')))(input)?;
    let (input, _) = context("'{' opening the shape list", preceded(ws, char('{')))(input)?;
    let (input, shapes) = separated_list1(
        delimited(ws, char(','), ws),
        map(preceded(ws, identifier), |s| s.to_lowercase()),
    )(input)?;
    let (input, _) = context("closing '}' after shapes", preceded(ws, char('}')))(input)?;
    let (input, features) = opt(preceded(ws, features_block))(input)?;

    let (input, phenomenon) = opt(|i| {
        let (i, _) = preceded(ws, char('|'))(i)?;
        let (i, _) = ws(i)?;
        let (i, word) = identifier(i)?;
        if !word.eq_ignore_ascii_case("phenomenon") {
            return backtrack(i);
        }
        phenomenon_body(i)
    })(input)?;

    Ok((
        input,
        AmorphousDescription {
            subtype: subtype.map(|s| s.to_lowercase()),
            shapes,
            features,
            phenomenon,
            doc_comments: None,
            definitions: None,
        },
    ))
}

// ============================================================================
// Form expressions (precedence ladder)
// ============================================================================

struct AggClause {
    arrangement: String,
    count: u32,
    spacing: Option<String>,
    orientation: Option<String>,
    orientation_param: Option<f64>,
}

fn apply_aggregate(node: FormNode, clause: AggClause) -> FormNode {
    FormNode::Aggregate(AggregateSpec {
        form: Box::new(node),
        arrangement: clause.arrangement,
        count: clause.count,
        spacing: clause.spacing,
        orientation: clause.orientation,
        orientation_param: clause.orientation_param,
    })
}

/// Parses a `+`-joined form expression.
///
/// An aggregate clause followed by `+` binds to the preceding term; an
/// aggregate clause that ends the expression applies to the whole of it,
/// wrapping a multi-term list in a synthetic group.
fn form_expr<'a>(input: &'a str, system: &str) -> PResult<'a, Vec<FormNode>> {
    let mut terms: Vec<FormNode> = Vec::new();
    let (mut input, mut term) = growth_term(input, system)?;
    loop {
        if let Ok((rest, _)) = preceded(ws, char::<_, VerboseError<&str>>('~'))(input) {
            let (rest, clause) = aggregate_clause(rest)?;
            if let Ok((after_plus, _)) = preceded(ws, char::<_, VerboseError<&str>>('+'))(rest) {
                terms.push(apply_aggregate(term, clause));
                let (rest, next) = growth_term(after_plus, system)?;
                input = rest;
                term = next;
            } else if preceded(ws, char::<_, VerboseError<&str>>('~'))(rest).is_ok() {
                term = apply_aggregate(term, clause);
                input = rest;
            } else {
                let inner = if terms.is_empty() {
                    term
                } else {
                    terms.push(term);
                    FormNode::Group(FormGroup::new(std::mem::take(&mut terms)))
                };
                return Ok((rest, vec![apply_aggregate(inner, clause)]));
            }
        } else if let Ok((rest, _)) = preceded(ws, char::<_, VerboseError<&str>>('+'))(input) {
            terms.push(term);
            let (rest, next) = growth_term(rest, system)?;
            input = rest;
            term = next;
        } else {
            terms.push(term);
            return Ok((input, terms));
        }
    }
}

/// `base > overgrowth`, right-associative.
fn growth_term<'a>(input: &'a str, system: &str) -> PResult<'a, FormNode> {
    let (input, base) = postfix_term(input, system)?;
    if let Ok((rest, _)) = preceded(ws, char::<_, VerboseError<&str>>('>'))(input) {
        let (rest, overgrowth) = growth_term(rest, system)?;
        Ok((rest, FormNode::nested(base, overgrowth)))
    } else {
        Ok((input, base))
    }
}

/// A primary with its tightly-bound postfixes (`@scale`, `[features]`).
fn postfix_term<'a>(input: &'a str, system: &str) -> PResult<'a, FormNode> {
    let (input, _) = ws(input)?;
    if let Ok(result) = labeled_primary(input, system) {
        return Ok(result);
    }
    match input.chars().next() {
        Some('(') => group_expr(input, system, None),
        Some('{') => {
            let (rest, miller) = miller_index(input)?;
            decorated_form(rest, CrystalForm::new(miller), None)
        }
        _ => named_form_term(input, system, None),
    }
}

/// `label:` prefix before a Miller index, a named form or a group. A bareword
/// that is itself a named form is never a label.
fn labeled_primary<'a>(input: &'a str, system: &str) -> PResult<'a, FormNode> {
    let (rest, ident) = identifier(input)?;
    if catalog::named_form(system, &ident.to_lowercase()).is_some() {
        return backtrack(input);
    }
    let (rest, _) = delimited(ws, char(':'), ws)(rest)?;
    let label = Some(ident.to_string());
    match rest.chars().next() {
        Some('(') => group_expr(rest, system, label),
        Some('{') => {
            let (rest, miller) = miller_index(rest)?;
            decorated_form(rest, CrystalForm::new(miller), label)
        }
        _ => named_form_term(rest, system, label),
    }
}

fn named_form_term<'a>(
    input: &'a str,
    system: &str,
    label: Option<String>,
) -> PResult<'a, FormNode> {
    let (rest, ident) = context("form name or Miller index", identifier)(input)?;
    let name = ident.to_lowercase();
    let Some(miller) = catalog::named_form(system, &name) else {
        return failure(input, "known form name");
    };
    let mut form = CrystalForm::new(miller);
    form.name = Some(name);
    decorated_form(rest, form, label)
}

fn decorated_form<'a>(
    input: &'a str,
    mut form: CrystalForm,
    label: Option<String>,
) -> PResult<'a, FormNode> {
    form.label = label;
    let (input, scale) = opt(preceded(
        preceded(ws, char('@')),
        context("scale value after '@'", preceded(ws, number)),
    ))(input)?;
    if let Some(scale) = scale {
        form.scale = scale;
    }
    let (input, features) = opt(preceded(ws, features_block))(input)?;
    form.features = features;
    Ok((input, FormNode::Form(form)))
}

/// `( form-expr [ | twin(...) ] ) [features] [ | twin(...) ]`
fn group_expr<'a>(
    input: &'a str,
    system: &str,
    label: Option<String>,
) -> PResult<'a, FormNode> {
    let (input, _) = char('(')(input)?;
    let (input, forms) = form_expr(input, system)?;
    let (input, inner_twin) = opt(group_twin)(input)?;
    let (input, _) = context("closing ')'", preceded(ws, char(')')))(input)?;
    let (input, features) = opt(preceded(ws, features_block))(input)?;
    let (input, outer_twin) = if inner_twin.is_none() {
        opt(group_twin)(input)?
    } else {
        (input, None)
    };
    Ok((
        input,
        FormNode::Group(FormGroup {
            forms,
            features,
            label,
            twin: inner_twin.or(outer_twin),
        }),
    ))
}

fn group_twin(input: &str) -> PResult<TwinSpec> {
    let (rest, _) = preceded(ws, char('|'))(input)?;
    let (rest, _) = ws(rest)?;
    let (rest, word) = identifier(rest)?;
    if !word.eq_ignore_ascii_case("twin") {
        return backtrack(input);
    }
    twin_body(rest)
}

// ============================================================================
// Miller indices
// ============================================================================

/// `{...}` with two literal styles: dense (`10-11`, one signed digit per
/// index) and separated (`1 0 -1 1`, whitespace or commas between full
/// integers). The style is chosen by whether the payload holds one token or
/// several.
fn miller_index(input: &str) -> PResult<MillerIndex> {
    let (after_brace, _) = char('{')(input)?;
    let (rest, payload) = take_while(|c| c != '}')(after_brace)?;
    let (rest, _) = context("closing '}' after Miller indices", char('}'))(rest)?;

    let indices = match parse_miller_payload(payload) {
        Ok(indices) => indices,
        Err(expected) => return failure(after_brace, expected),
    };
    match indices[..] {
        [h, k, l] => Ok((rest, MillerIndex::new(h, k, l))),
        [h, k, i, l] => Ok((rest, MillerIndex::bravais(h, k, i, l))),
        _ => failure(after_brace, "Miller index with 3 or 4 components"),
    }
}

fn parse_miller_payload(payload: &str) -> Result<Vec<i32>, &'static str> {
    let tokens: Vec<&str> = payload
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|t| !t.is_empty())
        .collect();
    match tokens[..] {
        [] => Err("Miller indices inside '{...}'"),
        [dense] => parse_dense_miller(dense),
        _ => tokens
            .iter()
            .map(|t| t.parse::<i32>().map_err(|_| "signed Miller index"))
            .collect(),
    }
}

/// Dense notation: every digit is one index, `-` negates the digit after it.
fn parse_dense_miller(text: &str) -> Result<Vec<i32>, &'static str> {
    let mut out = Vec::new();
    let mut negate = false;
    for ch in text.chars() {
        match ch {
            '-' if !negate => negate = true,
            d if d.is_ascii_digit() => {
                let value = (d as i32) - ('0' as i32);
                out.push(if negate { -value } else { value });
                negate = false;
            }
            _ => return Err("dense Miller digits"),
        }
    }
    if negate {
        return Err("digit after '-' in Miller index");
    }
    Ok(out)
}

// ============================================================================
// Aggregates
// ============================================================================

/// After `~`: `arrangement[count] [@spacing] [[orientation[:param]]]`.
fn aggregate_clause(input: &str) -> PResult<AggClause> {
    let (input, arrangement) = context("aggregate arrangement", preceded(ws, identifier))(input)?;
    let (input, _) = context("'[' before aggregate count", preceded(ws, char('[')))(input)?;
    let (input, count) = context("aggregate count", delimited(ws, count_u32, ws))(input)?;
    let (input, _) = context("closing ']' after count", char(']'))(input)?;
    let (input, spacing) = opt(preceded(preceded(ws, char('@')), spacing_value))(input)?;
    let (input, orientation) = opt(orientation_block)(input)?;
    let (orientation, orientation_param) = match orientation {
        Some((name, param)) => (Some(name), param),
        None => (None, None),
    };
    Ok((
        input,
        AggClause {
            arrangement: arrangement.to_lowercase(),
            count,
            spacing,
            orientation,
            orientation_param,
        },
    ))
}

/// A spacing like `2mm` or `0.5`, kept verbatim.
fn spacing_value(input: &str) -> PResult<String> {
    map(
        recognize(pair(
            tuple((opt(char('-')), digit1, opt(pair(char('.'), digit1)))),
            opt(alpha1),
        )),
        |s: &str| s.to_string(),
    )(input)
}

fn orientation_block(input: &str) -> PResult<(String, Option<f64>)> {
    let (input, _) = preceded(ws, char('['))(input)?;
    let (input, name) = preceded(ws, identifier)(input)?;
    let (input, param) = opt(preceded(delimited(ws, char(':'), ws), number))(input)?;
    let (input, _) = preceded(ws, char(']'))(input)?;
    Ok((input, (name.to_lowercase(), param)))
}

// ============================================================================
// Features
// ============================================================================

/// `[ feature (, feature)* ]`; an empty `[]` is an empty list.
fn features_block(input: &str) -> PResult<Vec<Feature>> {
    let (input, _) = char('[')(input)?;
    let (mut input, _) = ws(input)?;
    let mut features = Vec::new();
    if let Ok((rest, _)) = char::<_, VerboseError<&str>>(']')(input) {
        return Ok((rest, features));
    }
    loop {
        let (rest, feat) = feature(input)?;
        features.push(feat);
        if let Ok((rest, _)) = delimited(ws, char::<_, VerboseError<&str>>(','), ws)(rest) {
            input = rest;
        } else {
            let (rest, _) = context("closing ']' after features", preceded(ws, char(']')))(rest)?;
            return Ok((rest, features));
        }
    }
}

/// `name[:value[, value ...]]`; a comma followed by `name:` starts the next
/// feature rather than another value.
fn feature(input: &str) -> PResult<Feature> {
    let (input, name) = context("feature name", identifier)(input)?;
    let name = name.to_lowercase();
    let (mut input, first) =
        opt(preceded(delimited(ws, char(':'), ws), feature_value))(input)?;
    let mut values = Vec::new();
    if let Some(first) = first {
        values.push(first);
        while let Ok((rest, _)) = delimited(ws, char::<_, VerboseError<&str>>(','), ws)(input) {
            if starts_new_feature(rest) {
                break;
            }
            let (rest, value) = feature_value(rest)?;
            values.push(value);
            input = rest;
        }
    }
    Ok((input, Feature { name, values }))
}

fn starts_new_feature(input: &str) -> bool {
    identifier(input)
        .ok()
        .map(|(rest, _)| preceded(ws, char::<_, VerboseError<&str>>(':'))(rest).is_ok())
        .unwrap_or(false)
}

fn feature_value(input: &str) -> PResult<FeatureValue> {
    alt((numeric_feature_value, word_feature_value))(input)
}

fn numeric_feature_value(input: &str) -> PResult<FeatureValue> {
    let (rest, text) = recognize(tuple((
        opt(char('-')),
        digit1,
        opt(pair(char('.'), digit1)),
    )))(input)?;
    let value = if text.contains('.') {
        FeatureValue::Decimal(text.parse().map_err(|_| {
            NomErr::Error(VerboseError::from_error_kind(input, ErrorKind::Float))
        })?)
    } else {
        FeatureValue::Integer(text.parse().map_err(|_| {
            NomErr::Error(VerboseError::from_error_kind(input, ErrorKind::Digit))
        })?)
    };
    Ok((rest, value))
}

/// A bareword or a hyphen-joined colour chain like `pink-white-green`.
fn word_feature_value(input: &str) -> PResult<FeatureValue> {
    let (rest, first) = identifier(input)?;
    let (rest, more) = many0(preceded(char('-'), identifier))(rest)?;
    let value = if more.is_empty() {
        FeatureValue::Word(first.to_lowercase())
    } else {
        let mut parts = vec![first.to_lowercase()];
        parts.extend(more.iter().map(|p| p.to_lowercase()));
        FeatureValue::ColorSpec(parts)
    };
    Ok((rest, value))
}

fn bare_feature_list(input: &str) -> PResult<Vec<Feature>> {
    separated_list1(delimited(ws, char(','), ws), preceded(ws, feature))(input)
}

// ============================================================================
// Modifier clauses
// ============================================================================

fn modification_list(input: &str) -> PResult<Vec<Modification>> {
    separated_list1(delimited(ws, char(','), ws), modification)(input)
}

/// `kind(name:value, ...)`; the kind is checked against the catalog by the
/// validator, not here.
fn modification(input: &str) -> PResult<Modification> {
    let (input, kind) = preceded(ws, identifier)(input)?;
    let (input, _) = context("'(' after modification kind", preceded(ws, char('(')))(input)?;
    let (input, params) = separated_list1(delimited(ws, char(','), ws), mod_param)(input)?;
    let (input, _) = context("closing ')' after parameters", preceded(ws, char(')')))(input)?;
    Ok((
        input,
        Modification {
            kind: kind.to_lowercase(),
            params,
        },
    ))
}

fn mod_param(input: &str) -> PResult<(String, ParamValue)> {
    let (input, name) = context("parameter name", preceded(ws, identifier))(input)?;
    let (input, _) = context("':' between parameter and value", preceded(ws, char(':')))(input)?;
    let (input, value) = context("parameter value", preceded(ws, param_value))(input)?;
    Ok((input, (name.to_lowercase(), value)))
}

fn param_value(input: &str) -> PResult<ParamValue> {
    alt((
        map(number, ParamValue::Number),
        map(identifier, |w| ParamValue::Word(w.to_lowercase())),
    ))(input)
}

/// After the `twin` keyword: `(law [, repeat])` or `([h,k,l], angle [, type])`.
fn twin_body(input: &str) -> PResult<TwinSpec> {
    let (input, _) = context("'(' after twin", preceded(ws, char('(')))(input)?;
    let (input, _) = ws(input)?;
    let (input, spec) = if input.starts_with('[') {
        let (input, _) = char('[')(input)?;
        let (input, x) = delimited(ws, int32, ws)(input)?;
        let (input, _) = char(',')(input)?;
        let (input, y) = delimited(ws, int32, ws)(input)?;
        let (input, _) = char(',')(input)?;
        let (input, z) = delimited(ws, int32, ws)(input)?;
        let (input, _) = context("closing ']' after twin axis", char(']'))(input)?;
        let (input, _) = context("',' before twin angle", preceded(ws, char(',')))(input)?;
        let (input, angle) = context("twin angle", preceded(ws, number))(input)?;
        let (input, twin_type) =
            opt(preceded(delimited(ws, char(','), ws), twin_type_keyword))(input)?;
        (
            input,
            TwinSpec::Custom {
                axis: [x, y, z],
                angle,
                twin_type,
            },
        )
    } else {
        let (input, law) = context("twin law name or '[h,k,l]' axis", identifier)(input)?;
        let (input, repeat) = opt(preceded(delimited(ws, char(','), ws), count_u32))(input)?;
        (
            input,
            TwinSpec::Law {
                law: law.to_lowercase(),
                repeat,
            },
        )
    };
    let (input, _) = context("closing ')' after twin", preceded(ws, char(')')))(input)?;
    Ok((input, spec))
}

fn twin_type_keyword(input: &str) -> PResult<TwinType> {
    let (rest, word) = identifier(input)?;
    match TwinType::from_keyword(&word.to_lowercase()) {
        Some(t) => Ok((rest, t)),
        None => failure(input, "twin type contact, penetration or cyclic"),
    }
}

/// After the `phenomenon` keyword: `[kind [:head] (, param)*]`. A numeric
/// head value is stored as `value`, an identifier head as `intensity`.
fn phenomenon_body(input: &str) -> PResult<PhenomenonSpec> {
    let (input, _) = context("'[' after phenomenon", preceded(ws, char('[')))(input)?;
    let (input, kind) = context("phenomenon kind", preceded(ws, identifier))(input)?;
    let kind = kind.to_lowercase();

    let mut params = Vec::new();
    let (mut input, head) =
        opt(preceded(delimited(ws, char(':'), ws), param_value))(input)?;
    if let Some(value) = head {
        let name = match value {
            ParamValue::Number(_) => "value",
            ParamValue::Word(_) => "intensity",
        };
        params.push(PhenomenonParam {
            name: name.to_string(),
            value: Some(value),
        });
    }

    while let Ok((rest, _)) = delimited(ws, char::<_, VerboseError<&str>>(','), ws)(input) {
        if let Ok((rest, value)) = number(rest) {
            params.push(PhenomenonParam {
                name: "value".to_string(),
                value: Some(ParamValue::Number(value)),
            });
            input = rest;
            continue;
        }
        let (rest, name) = context("phenomenon parameter", identifier)(rest)?;
        let (rest, value) =
            opt(preceded(delimited(ws, char(':'), ws), param_value))(rest)?;
        params.push(PhenomenonParam {
            name: name.to_lowercase(),
            value,
        });
        input = rest;
    }
    let (input, _) = context("closing ']' after phenomenon", preceded(ws, char(']')))(input)?;
    Ok((input, PhenomenonSpec { kind, params }))
}

// ============================================================================
// Tests
// ============================================================================
