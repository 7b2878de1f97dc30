//! Query text adapter.
//!
//! ```text
//! query     = [ "#" id ] [ sep ] node ( sep node )*
//! sep       = "->" | "<-" | "<<" | [ ">" ] "**" [ ">" ] | ">" | "<"
//! node      = [ "+" | "-" ] ( text_star [ ": " node_text_star ] )? [ tags ]
//! tags      = ":{" tag ( "," tag )* "}"
//! ```
//!
//! A lone word is a type when the registry knows it, a text otherwise.

use nom::branch::alt;
use nom::bytes::complete::{tag, take_while1, take_while_m_n};
use nom::character::complete::{anychar, char, multispace0, multispace1, none_of, one_of};
use nom::combinator::{cut, eof, map, map_opt, not, opt, peek, recognize, value};
use nom::error::{ErrorKind, ParseError};
use nom::multi::{fold_many0, many0, many1_count, separated_list1};
use nom::sequence::{delimited, pair, preceded, terminated, tuple};
use nom::{IResult, Parser};
use tracing::instrument;

use crate::domain::behavior::NodeRegistry;
use crate::domain::error::{TreeError, TreeResult};
use crate::domain::id::{NodeId, ID_LENGTH};
use crate::query::ast::{CreateRel, Matcher, Placement, Plurality, Query, Retrieval, Segment};

/// Parses query text into a [`Query`].
#[instrument(level = "trace", skip(registry))]
pub fn parse_query(input: &str, registry: &NodeRegistry) -> TreeResult<Query> {
    let raw = match query(input) {
        Ok((_, raw)) => raw,
        Err(nom::Err::Error(e) | nom::Err::Failure(e)) => {
            let offset = input.len() - e.input.len();
            let reason = match e.code {
                ErrorKind::Eof => "expected a separator".to_string(),
                code => format!("unexpected input ({})", code.description()),
            };
            return Err(TreeError::invalid_query(input, format!("{reason} at offset {offset}")));
        }
        Err(nom::Err::Incomplete(_)) => {
            return Err(TreeError::invalid_query(input, "incomplete query"));
        }
    };

    let retrieval = match raw.first_separator {
        Some(sep) => sep,
        None if raw.node_id.is_some() => Retrieval::SelfNode,
        None => Retrieval::Children,
    };
    let mut first = segment(input, registry, retrieval, raw.first)?;
    first.node_id = raw.node_id;
    let mut segments = vec![first];
    for (retrieval, node) in raw.rest {
        segments.push(segment(input, registry, retrieval, node)?);
    }
    Query::new(segments)
}

#[derive(Debug)]
struct RawQuery {
    node_id: Option<NodeId>,
    first_separator: Option<Retrieval>,
    first: RawNode,
    rest: Vec<(Retrieval, RawNode)>,
}

#[derive(Debug, Default)]
struct RawNode {
    rel: CreateRel,
    /// First text and the text after `": "`, if any.
    head: Option<(String, Option<String>)>,
    tags: Vec<String>,
}

// ============================================================
// Grammar
// ============================================================

fn ws<'a, F, O, E: ParseError<&'a str>>(inner: F) -> impl FnMut(&'a str) -> IResult<&'a str, O, E>
where
    F: Parser<&'a str, O, E>,
{
    delimited(multispace0, inner, multispace0)
}

#[instrument(level = "trace")]
fn query(input: &str) -> IResult<&str, RawQuery> {
    let (input, node_id) = opt(node_id)(input)?;
    let (input, first_separator) = opt(separator)(input)?;
    let (input, first) = node(input)?;
    let (input, rest) = many0(pair(separator, node))(input)?;
    let (input, _) = preceded(multispace0, eof)(input)?;
    Ok((
        input,
        RawQuery {
            node_id,
            first_separator,
            first,
            rest,
        },
    ))
}

/// `#` and a five character id, followed by the end or a separator.
fn node_id(input: &str) -> IResult<&str, NodeId> {
    terminated(
        preceded(
            pair(multispace0, char('#')),
            map_opt(
                take_while_m_n(ID_LENGTH, ID_LENGTH, |c: char| c.is_ascii_alphanumeric()),
                |raw: &str| NodeId::parse(raw).ok(),
            ),
        ),
        peek(alt((value((), preceded(multispace0, eof)), value((), separator)))),
    )(input)
}

/// A separator, leading whitespace included.
fn separator(input: &str) -> IResult<&str, Retrieval> {
    preceded(
        multispace0,
        alt((
            value(Retrieval::NextPeer, tag("->")),
            value(Retrieval::PrevPeer, tag("<-")),
            value(Retrieval::Root, tag("<<")),
            value(
                Retrieval::Flatten,
                tuple((
                    opt(pair(char('>'), multispace0)),
                    tag("**"),
                    opt(preceded(multispace0, char('>'))),
                )),
            ),
            value(Retrieval::Children, tag(">")),
            value(Retrieval::Parents, tag("<")),
        )),
    )(input)
}

#[instrument(level = "trace")]
fn node(input: &str) -> IResult<&str, RawNode> {
    let (input, _) = multispace0(input)?;
    let (input, rel) = opt(create_rel)(input)?;
    let (input, head) = opt(head)(input)?;
    let (input, tags) = opt(tags)(input)?;
    Ok((
        input,
        RawNode {
            rel: rel.unwrap_or_default(),
            head,
            tags: tags.unwrap_or_default(),
        },
    ))
}

/// `+` or a `-` that does not start `->`.
fn create_rel(input: &str) -> IResult<&str, CreateRel> {
    alt((
        value(CreateRel::Last, char('+')),
        value(CreateRel::First, terminated(char('-'), not(char('>')))),
    ))(input)
}

#[instrument(level = "trace")]
fn head(input: &str) -> IResult<&str, (String, Option<String>)> {
    pair(
        type_text,
        opt(preceded(pair(type_separator, multispace0), cut(node_text))),
    )(input)
}

/// `:` followed by whitespace; `:{` opens tags instead.
fn type_separator(input: &str) -> IResult<&str, ()> {
    value((), terminated(char(':'), peek(multispace1)))(input)
}

fn tags_open(input: &str) -> IResult<&str, &str> {
    preceded(multispace0, tag(":{"))(input)
}

fn type_text(input: &str) -> IResult<&str, String> {
    alt((quoted, map(type_word, |raw: &str| raw.trim_end().to_string())))(input)
}

fn node_text(input: &str) -> IResult<&str, String> {
    alt((quoted, map(text_word, |raw: &str| raw.trim_end().to_string())))(input)
}

/// Bare text up to a separator, tags or a type separator.
fn type_word(input: &str) -> IResult<&str, &str> {
    recognize(many1_count(preceded(not(type_word_end), anychar)))(input)
}

fn type_word_end(input: &str) -> IResult<&str, ()> {
    alt((value((), separator), value((), tags_open), type_separator))(input)
}

/// Bare text up to a separator or tags.
fn text_word(input: &str) -> IResult<&str, &str> {
    recognize(many1_count(preceded(not(text_word_end), anychar)))(input)
}

fn text_word_end(input: &str) -> IResult<&str, ()> {
    alt((value((), separator), value((), tags_open)))(input)
}

fn quoted(input: &str) -> IResult<&str, String> {
    terminated(alt((double_quoted, single_quoted)), multispace0)(input)
}

fn double_quoted(input: &str) -> IResult<&str, String> {
    quoted_with(input, '"', "\"\\")
}

fn single_quoted(input: &str) -> IResult<&str, String> {
    quoted_with(input, '\'', "'\\")
}

/// Quoted text; `\\`, `\"` and `\'` are the only escapes.
#[instrument(level = "trace")]
fn quoted_with<'a>(input: &'a str, quote: char, plain: &'static str) -> IResult<&'a str, String> {
    let (input, _) = char(quote)(input)?;
    cut(terminated(
        fold_many0(
            alt((preceded(char('\\'), one_of("\\\"'")), none_of(plain))),
            String::new,
            |mut text: String, c: char| {
                text.push(c);
                text
            },
        ),
        char(quote),
    ))(input)
}

#[instrument(level = "trace")]
fn tags(input: &str) -> IResult<&str, Vec<String>> {
    preceded(
        tags_open,
        cut(terminated(
            separated_list1(char(','), ws(tag_name)),
            char('}'),
        )),
    )(input)
}

fn tag_name(input: &str) -> IResult<&str, String> {
    map(take_while1(|c: char| c != ',' && c != '}'), |raw: &str| {
        raw.trim().to_string()
    })(input)
}

// ============================================================
// Segments
// ============================================================

fn segment(
    input: &str,
    registry: &NodeRegistry,
    retrieval: Retrieval,
    raw: RawNode,
) -> TreeResult<Segment> {
    let mut segment = Segment::new(retrieval);
    let matcher = raw.head.map(|(first, second)| match second {
        Some(text) => Matcher {
            node_type: non_star(first),
            text: non_star(text),
            rel: raw.rel,
        },
        None => match non_star(first) {
            None => Matcher::default(),
            Some(word) if registry.contains(&word) => Matcher {
                node_type: Some(word),
                ..Matcher::default()
            },
            Some(word) => Matcher {
                text: Some(word),
                ..Matcher::default()
            },
        },
    });
    if raw.rel != CreateRel::Default && !matcher.as_ref().is_some_and(Matcher::is_rigid) {
        return Err(TreeError::invalid_query(
            input,
            "'+' and '-' need both a type and a text",
        ));
    }
    segment.matcher = matcher.filter(|m| m.node_type.is_some() || m.text.is_some());
    for tag in &raw.tags {
        apply_tag(input, &mut segment, tag)?;
    }
    Ok(segment)
}

fn apply_tag(input: &str, segment: &mut Segment, tag: &str) -> TreeResult<()> {
    let plurality = match tag {
        "first" => Some(Plurality::First),
        "last" => Some(Plurality::Last),
        "many" => Some(Plurality::Many),
        _ => None,
    };
    let placement = match tag {
        "before" => Some(Placement::Before),
        "after" => Some(Placement::After),
        _ => None,
    };
    if let Some(plurality) = plurality {
        if segment.plurality.is_some() {
            return Err(TreeError::invalid_query(
                input,
                "more than one of first, last and many",
            ));
        }
        segment.plurality = Some(plurality);
    } else if let Some(placement) = placement {
        if segment.placement.is_some_and(|p| p != placement) {
            return Err(TreeError::cant_create(
                input,
                "cannot place before and after at once",
            ));
        }
        segment.placement = Some(placement);
    } else {
        segment.tags.insert(tag.to_string());
    }
    Ok(())
}

fn non_star(text: String) -> Option<String> {
    if text.starts_with('*') {
        None
    } else {
        Some(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::nodes::builtin_registry;

    fn parse(input: &str) -> Query {
        parse_query(input, &builtin_registry()).unwrap()
    }

    #[test]
    fn given_typed_path_when_parsing_then_segments_are_children() {
        let query = parse("task: A > task: B");
        assert_eq!(query.segments.len(), 2);
        assert_eq!(query.segments[0].retrieval, Retrieval::Children);
        let m = query.segments[1].matcher.as_ref().unwrap();
        assert_eq!(m.node_type.as_deref(), Some("task"));
        assert_eq!(m.text.as_deref(), Some("B"));
    }

    #[test]
    fn given_bare_words_when_parsing_then_registry_decides_type_or_text() {
        let query = parse("task > frobnicate");
        let first = query.segments[0].matcher.as_ref().unwrap();
        assert_eq!(first.node_type.as_deref(), Some("task"));
        assert_eq!(first.text, None);
        let second = query.segments[1].matcher.as_ref().unwrap();
        assert_eq!(second.node_type, None);
        assert_eq!(second.text.as_deref(), Some("frobnicate"));
    }

    #[test]
    fn given_every_separator_when_parsing_then_retrievals_match() {
        let query = parse("-> a <- b << > c ** d > ** > e < f");
        let kinds: Vec<_> = query.segments.iter().map(|s| s.retrieval).collect();
        assert_eq!(
            kinds,
            vec![
                Retrieval::NextPeer,
                Retrieval::PrevPeer,
                Retrieval::Root,
                Retrieval::Children,
                Retrieval::Flatten,
                Retrieval::Flatten,
                Retrieval::Parents,
            ]
        );
        assert!(query.segments[2].matcher.is_none());
    }

    #[test]
    fn given_id_anchor_when_parsing_then_defaults_to_self() {
        let query = parse("#abcde");
        assert_eq!(query.segments.len(), 1);
        assert_eq!(query.segments[0].retrieval, Retrieval::SelfNode);
        assert_eq!(query.segments[0].node_id.as_ref().unwrap().as_str(), "abcde");

        let query = parse("#trgt2 > task: x");
        assert_eq!(query.segments[0].retrieval, Retrieval::Children);
    }

    #[test]
    fn given_hash_word_of_other_length_when_parsing_then_it_is_text() {
        let query = parse("#abcdef");
        assert_eq!(query.segments[0].node_id, None);
        let m = query.segments[0].matcher.as_ref().unwrap();
        assert_eq!(m.text.as_deref(), Some("#abcdef"));
    }

    #[test]
    fn given_tags_when_parsing_then_split_into_plurality_placement_and_filters() {
        let query = parse("> task: x :{first, before, can_activate}");
        let seg = &query.segments[0];
        assert_eq!(seg.plurality, Some(Plurality::First));
        assert_eq!(seg.placement, Some(Placement::Before));
        assert!(seg.tags.contains("can_activate"));
        assert_eq!(seg.tags.len(), 1);
    }

    #[test]
    fn given_quoted_text_when_parsing_then_separators_inside_are_kept() {
        let query = parse(r#"task: "a > b \" c""#);
        let m = query.segments[0].matcher.as_ref().unwrap();
        assert_eq!(m.text.as_deref(), Some(r#"a > b " c"#));
    }

    #[test]
    fn given_colon_inside_node_text_when_parsing_then_kept_in_text() {
        let query = parse("task: a: b > comment");
        let m = query.segments[0].matcher.as_ref().unwrap();
        assert_eq!(m.node_type.as_deref(), Some("task"));
        assert_eq!(m.text.as_deref(), Some("a: b"));
        assert_eq!(query.segments.len(), 2);
    }

    #[test]
    fn given_rel_shorthand_when_parsing_then_sets_create_rel() {
        let query = parse("> +task: x");
        let m = query.segments[0].matcher.as_ref().unwrap();
        assert_eq!(m.rel, CreateRel::Last);
        let query = parse("-> -task: x");
        assert_eq!(query.segments[0].matcher.as_ref().unwrap().rel, CreateRel::First);
    }

    #[test]
    fn given_invalid_inputs_when_parsing_then_errors() {
        let registry = builtin_registry();
        assert!(parse_query("+task", &registry).is_err());
        assert!(parse_query("x :{first, last}", &registry).is_err());
        assert!(matches!(
            parse_query("x :{before, after}", &registry),
            Err(TreeError::CantCreate { .. })
        ));
        assert!(parse_query("task: 'open", &registry).is_err());
        assert!(parse_query(r#"task: "bad \q escape""#, &registry).is_err());
        assert!(parse_query("x :{first,", &registry).is_err());
        assert!(parse_query("x :{ , }", &registry).is_err());
    }

    #[test]
    fn given_text_after_quote_when_parsing_then_separator_expected() {
        let result = parse_query("task: 'a' b", &builtin_registry());
        match result {
            Err(TreeError::InvalidQuery { reason, .. }) => {
                assert!(reason.starts_with("expected a separator"), "{reason}");
            }
            other => panic!("expected InvalidQuery, got {other:?}"),
        }
    }

    #[test]
    fn given_empty_text_when_parsing_then_single_children_wildcard() {
        let query = parse("");
        assert_eq!(query.segments.len(), 1);
        assert_eq!(query.segments[0].retrieval, Retrieval::Children);
        assert!(query.segments[0].matcher.is_none());
    }
}
