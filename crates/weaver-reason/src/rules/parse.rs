//! Parsers for rule pattern fragments, filters and create templates.
//!
//! Grammar (whitespace allowed between tokens):
//!
//! ```text
//! fragment := node (edge node)*
//! node     := "(" ident (":" ident)? props? ")"
//! edge     := "-" bracket "->" | "<-" bracket "-" | "-" bracket "-"
//! bracket  := "[" ident? (":" ident)? props? "]"
//! props    := "{" (ident ":" literal ("," ident ":" literal)*)? "}"
//! filters  := filter ("AND" filter)*
//! filter   := ident "." ident op (ident "." ident | literal)
//! op       := "=" | "<>" | "!=" | "<" | "<=" | ">" | ">="
//! literal  := 'text' | "text" | integer | float | true | false
//! ```

use nom::{
    branch::alt,
    bytes::complete::{tag, tag_no_case, take_while, take_while1},
    character::complete::{char as pchar, digit1, multispace0, multispace1},
    combinator::{all_consuming, map, not, opt, peek, recognize},
    multi::{many0, separated_list0, separated_list1},
    sequence::{delimited, pair, preceded, terminated, tuple},
    IResult,
};

use weaver_core::{Direction, Label, PropertyKey, PropertyValue, RelType, Var};
use weaver_graph::{CmpOp, EdgePattern, Filter, NodePattern, Operand, PathPattern, PropertyRef};

// ── Lexical ──────────────────────────────────────────────────────

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_continue(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn ident(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        take_while1(is_ident_start),
        take_while(is_ident_continue),
    ))(input)
}

/// Wrap a parser so it skips surrounding whitespace.
fn ws<'a, O>(
    inner: impl FnMut(&'a str) -> IResult<&'a str, O>,
) -> impl FnMut(&'a str) -> IResult<&'a str, O> {
    delimited(multispace0, inner, multispace0)
}

fn quoted_string(input: &str) -> IResult<&str, &str> {
    alt((
        delimited(pchar('\''), take_while(|c| c != '\''), pchar('\'')),
        delimited(pchar('"'), take_while(|c| c != '"'), pchar('"')),
    ))(input)
}

fn number(input: &str) -> IResult<&str, PropertyValue> {
    let (rest, text) = recognize(tuple((
        opt(pchar('-')),
        digit1,
        opt(pair(pchar('.'), digit1)),
    )))(input)?;

    let value = if text.contains('.') {
        text.parse::<f64>().ok().map(PropertyValue::Float)
    } else {
        text.parse::<i64>().ok().map(PropertyValue::Int)
    };
    match value {
        Some(v) => Ok((rest, v)),
        None => Err(nom::Err::Error(nom::error::Error::new(
            input,
            nom::error::ErrorKind::Digit,
        ))),
    }
}

fn boolean(input: &str) -> IResult<&str, PropertyValue> {
    terminated(
        alt((
            map(tag_no_case("true"), |_| PropertyValue::Bool(true)),
            map(tag_no_case("false"), |_| PropertyValue::Bool(false)),
        )),
        not(peek(take_while1(is_ident_continue))),
    )(input)
}

fn literal(input: &str) -> IResult<&str, PropertyValue> {
    alt((
        map(quoted_string, PropertyValue::from),
        number,
        boolean,
    ))(input)
}

/// `{key: literal, ...}`
fn property_map(input: &str) -> IResult<&str, Vec<(&str, PropertyValue)>> {
    delimited(
        pchar('{'),
        separated_list0(
            pchar(','),
            pair(ws(ident), preceded(pchar(':'), ws(literal))),
        ),
        preceded(multispace0, pchar('}')),
    )(input)
}

// ── Raw syntax ───────────────────────────────────────────────────

/// Node syntax before identifier validation.
#[derive(Debug)]
struct RawNode<'a> {
    var: &'a str,
    label: Option<&'a str>,
    props: Vec<(&'a str, PropertyValue)>,
}

#[derive(Debug)]
struct RawEdge<'a> {
    var: Option<&'a str>,
    rel_type: Option<&'a str>,
    props: Vec<(&'a str, PropertyValue)>,
    direction: Direction,
}

fn raw_node(input: &str) -> IResult<&str, RawNode<'_>> {
    let (input, _) = pchar('(')(input)?;
    let (input, var) = ws(ident)(input)?;
    let (input, label) = opt(preceded(pchar(':'), ws(ident)))(input)?;
    let (input, props) = opt(ws(property_map))(input)?;
    let (input, _) = pchar(')')(input)?;
    Ok((
        input,
        RawNode {
            var,
            label,
            props: props.unwrap_or_default(),
        },
    ))
}

type RawBracket<'a> = (Option<&'a str>, Option<&'a str>, Vec<(&'a str, PropertyValue)>);

fn bracket(input: &str) -> IResult<&str, RawBracket<'_>> {
    let (input, _) = pchar('[')(input)?;
    let (input, var) = opt(ws(ident))(input)?;
    let (input, rel_type) = opt(preceded(ws(pchar(':')), ws(ident)))(input)?;
    let (input, props) = opt(ws(property_map))(input)?;
    let (input, _) = preceded(multispace0, pchar(']'))(input)?;
    Ok((input, (var, rel_type, props.unwrap_or_default())))
}

fn raw_edge(input: &str) -> IResult<&str, RawEdge<'_>> {
    let incoming = map(
        delimited(tag("<-"), bracket, pchar('-')),
        |b| (b, Direction::Incoming),
    );
    let forward = map(
        pair(preceded(pchar('-'), bracket), alt((tag("->"), tag("-")))),
        |(b, arrow)| {
            let direction = if arrow == "->" {
                Direction::Outgoing
            } else {
                Direction::Either
            };
            (b, direction)
        },
    );

    map(alt((incoming, forward)), |((var, rel_type, props), direction)| RawEdge {
        var,
        rel_type,
        props,
        direction,
    })(input)
}

type RawFragment<'a> = (RawNode<'a>, Vec<(RawEdge<'a>, RawNode<'a>)>);

fn raw_fragment(input: &str) -> IResult<&str, RawFragment<'_>> {
    pair(ws(raw_node), many0(pair(ws(raw_edge), ws(raw_node))))(input)
}

fn raw_property_ref(input: &str) -> IResult<&str, (&str, &str)> {
    pair(ident, preceded(pchar('.'), ident))(input)
}

fn cmp_op(input: &str) -> IResult<&str, CmpOp> {
    alt((
        map(tag("<>"), |_| CmpOp::Ne),
        map(tag("!="), |_| CmpOp::Ne),
        map(tag("<="), |_| CmpOp::Le),
        map(tag(">="), |_| CmpOp::Ge),
        map(tag("="), |_| CmpOp::Eq),
        map(tag("<"), |_| CmpOp::Lt),
        map(tag(">"), |_| CmpOp::Gt),
    ))(input)
}

enum RawOperand<'a> {
    Literal(PropertyValue),
    Property((&'a str, &'a str)),
}

type RawFilter<'a> = ((&'a str, &'a str), CmpOp, RawOperand<'a>);

fn raw_filter(input: &str) -> IResult<&str, RawFilter<'_>> {
    tuple((
        ws(raw_property_ref),
        ws(cmp_op),
        alt((
            map(raw_property_ref, RawOperand::Property),
            map(literal, RawOperand::Literal),
        )),
    ))(input)
}

fn raw_filters(input: &str) -> IResult<&str, Vec<RawFilter<'_>>> {
    separated_list1(
        delimited(multispace1, tag_no_case("AND"), multispace1),
        raw_filter,
    )(input)
}

// ── Typed conversion ─────────────────────────────────────────────

fn constraints(props: Vec<(&str, PropertyValue)>) -> Result<Vec<(PropertyKey, PropertyValue)>, String> {
    props
        .into_iter()
        .map(|(k, v)| Ok((PropertyKey::parse(k).map_err(|e| e.to_string())?, v)))
        .collect()
}

fn typed_node(raw: RawNode<'_>) -> Result<NodePattern, String> {
    let mut node = NodePattern::new(Var::parse(raw.var).map_err(|e| e.to_string())?);
    if let Some(label) = raw.label {
        node = node.with_label(Label::parse(label).map_err(|e| e.to_string())?);
    }
    node.properties = constraints(raw.props)?;
    Ok(node)
}

fn typed_edge(raw: RawEdge<'_>) -> Result<EdgePattern, String> {
    let rel_type = raw
        .rel_type
        .map(RelType::parse)
        .transpose()
        .map_err(|e| e.to_string())?;
    let mut edge = EdgePattern::new(rel_type, raw.direction);
    edge.var = raw
        .var
        .map(Var::parse)
        .transpose()
        .map_err(|e| e.to_string())?;
    edge.properties = constraints(raw.props)?;
    Ok(edge)
}

fn typed_ref((var, key): (&str, &str)) -> Result<PropertyRef, String> {
    Ok(PropertyRef {
        var: Var::parse(var).map_err(|e| e.to_string())?,
        key: PropertyKey::parse(key).map_err(|e| e.to_string())?,
    })
}

// ── Public entry points ──────────────────────────────────────────

/// Parse one `if` fragment such as
/// `(person:Person)-[:WORKS_ON]->(project:Project)`.
pub fn parse_fragment(text: &str) -> Result<PathPattern, String> {
    let (_, (start, hops)) = all_consuming(raw_fragment)(text.trim())
        .map_err(|_| "expected `(var:Label {..})` joined by `-[:TYPE]->` edges".to_string())?;

    let mut path = PathPattern::node(typed_node(start)?);
    for (edge, node) in hops {
        path = path.hop(typed_edge(edge)?, typed_node(node)?);
    }
    Ok(path)
}

/// Parse a `where` expression: comparisons joined by `AND`.
pub fn parse_filters(text: &str) -> Result<Vec<Filter>, String> {
    let (_, raw) = all_consuming(ws(raw_filters))(text)
        .map_err(|_| "expected `var.key OP value` comparisons joined by AND".to_string())?;

    raw.into_iter()
        .map(|(lhs, op, rhs)| {
            Ok(Filter {
                lhs: typed_ref(lhs)?,
                op,
                rhs: match rhs {
                    RawOperand::Literal(value) => Operand::Literal(value),
                    RawOperand::Property(r) => Operand::Property(typed_ref(r)?),
                },
            })
        })
        .collect()
}

/// A `then.create` template: one new edge between two bound variables.
#[derive(Debug, Clone, PartialEq)]
pub struct CreateTemplate {
    pub source: Var,
    pub source_label: Option<Label>,
    pub target: Var,
    pub target_label: Option<Label>,
    pub rel_type: RelType,
}

/// Parse a create template such as `(person)-[r:HAS_SKILL]->(tech)`.
///
/// `<-` swaps the endpoints so the template always reads source to target.
pub fn parse_create(text: &str) -> Result<CreateTemplate, String> {
    let path = parse_fragment(text)?;
    let [(edge, far)] = path.hops.as_slice() else {
        return Err("a create template must be exactly one edge between two nodes".to_string());
    };

    let rel_type = edge
        .rel_type
        .clone()
        .ok_or_else(|| "a create template must name the relationship type".to_string())?;
    if !edge.properties.is_empty() || !path.start.properties.is_empty() || !far.properties.is_empty()
    {
        return Err(
            "property constraints are not allowed in a create template; use `properties`"
                .to_string(),
        );
    }

    let near = &path.start;
    let (source, target) = match edge.direction {
        Direction::Outgoing => (near, far),
        Direction::Incoming => (far, near),
        Direction::Either => {
            return Err("a create template needs a direction (`->` or `<-`)".to_string())
        }
    };

    Ok(CreateTemplate {
        source: source.var.clone(),
        source_label: source.label.clone(),
        target: target.var.clone(),
        target_label: target.label.clone(),
        rel_type,
    })
}
