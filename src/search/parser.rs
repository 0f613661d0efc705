use std::iter;
use nom::branch::alt;
use nom::bytes::complete::{tag, take_while, take_while1};
use nom::character::complete::{char, digit1, multispace0, multispace1, one_of};
use nom::combinator::{all_consuming, map, map_res, opt};
use nom::multi::{many0, separated_list1};
use nom::sequence::{delimited, preceded, terminated};
use nom::{IResult, Parser};
use crate::core::error::{Error, Result};

/// Parsed boolean or extended query, before tokenization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryNode {
    /// Raw text between operators
    Term(String),
    /// Quoted text; `proximity` 0 means an exact phrase
    Phrase { text: String, proximity: u32 },
    /// Node limited to the named fields
    Field { fields: Vec<String>, node: Box<QueryNode> },
    And(Vec<QueryNode>),
    Or(Vec<QueryNode>),
    Not(Box<QueryNode>),
}

enum Item {
    Fields(Vec<String>),
    Node(QueryNode),
}

fn is_operator(c: char, extended: bool) -> bool {
    c.is_whitespace() || matches!(c, '(' | ')' | '|' | '&' | '!') || (extended && matches!(c, '"' | '@'))
}

fn term(input: &str, extended: bool) -> IResult<&str, QueryNode> {
    map(take_while1(move |c: char| !is_operator(c, extended)), |t: &str| {
        QueryNode::Term(t.to_string())
    })
    .parse(input)
}

fn phrase(input: &str) -> IResult<&str, QueryNode> {
    map(
        (
            delimited(char('"'), take_while(|c: char| c != '"'), char('"')),
            opt(preceded(char('~'), map_res(digit1, str::parse::<u32>))),
        ),
        |(text, proximity): (&str, Option<u32>)| QueryNode::Phrase {
            text: text.to_string(),
            proximity: proximity.unwrap_or(0),
        },
    )
    .parse(input)
}

fn ident(input: &str) -> IResult<&str, String> {
    map(take_while1(|c: char| c.is_alphanumeric() || c == '_'), str::to_string).parse(input)
}

fn field_spec(input: &str) -> IResult<&str, Vec<String>> {
    preceded(
        char('@'),
        alt((
            delimited(
                terminated(char('('), multispace0),
                separated_list1(delimited(multispace0, char(','), multispace0), ident),
                preceded(multispace0, char(')')),
            ),
            map(ident, |f| vec![f]),
        )),
    )
    .parse(input)
}

fn primary(input: &str, extended: bool) -> IResult<&str, QueryNode> {
    let group = delimited(
        terminated(char('('), multispace0),
        |i| or_expr(i, extended),
        preceded(multispace0, char(')')),
    );
    if extended {
        alt((group, phrase, |i| term(i, true))).parse(input)
    } else {
        alt((group, |i| term(i, false))).parse(input)
    }
}

fn unary(input: &str, extended: bool) -> IResult<&str, QueryNode> {
    alt((
        map(
            preceded(terminated(one_of("-!"), multispace0), |i| unary(i, extended)),
            |node| QueryNode::Not(Box::new(node)),
        ),
        |i| primary(i, extended),
    ))
    .parse(input)
}

fn and_item(input: &str, extended: bool) -> IResult<&str, Item> {
    if extended {
        alt((map(field_spec, Item::Fields), map(|i| unary(i, true), Item::Node))).parse(input)
    } else {
        map(|i| unary(i, false), Item::Node).parse(input)
    }
}

fn and_expr(input: &str, extended: bool) -> IResult<&str, QueryNode> {
    let (rest, first) = and_item(input, extended)?;
    let (rest, more) = many0(preceded(
        alt((delimited(multispace0, tag("&"), multispace0), multispace1)),
        |i| and_item(i, extended),
    ))
    .parse(rest)?;

    let mut fields: Option<Vec<String>> = None;
    let mut nodes = Vec::new();
    for item in iter::once(first).chain(more) {
        match item {
            Item::Fields(f) => fields = Some(f),
            Item::Node(node) => nodes.push(match &fields {
                Some(f) => QueryNode::Field { fields: f.clone(), node: Box::new(node) },
                None => node,
            }),
        }
    }
    match nodes.len() {
        0 => Err(nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Verify))),
        1 => Ok((rest, nodes.remove(0))),
        _ => Ok((rest, QueryNode::And(nodes))),
    }
}

fn or_expr(input: &str, extended: bool) -> IResult<&str, QueryNode> {
    map(
        separated_list1(delimited(multispace0, char('|'), multispace0), |i| and_expr(i, extended)),
        |mut nodes| if nodes.len() == 1 { nodes.remove(0) } else { QueryNode::Or(nodes) },
    )
    .parse(input)
}

/// Parses boolean syntax, or extended syntax when `extended` is set.
///
/// Boolean: whitespace or `&` for AND, `|` for OR, `-` or `!` for NOT,
/// parentheses. Extended adds `"exact phrase"`, `"proximity words"~N`
/// and `@field` / `@(f1,f2)` limits that apply to the rest of the
/// enclosing AND group.
pub fn parse_query(text: &str, extended: bool) -> Result<QueryNode> {
    all_consuming(delimited(multispace0, |i| or_expr(i, extended), multispace0))
        .parse(text)
        .map(|(_, node)| node)
        .map_err(|e| {
            let near = match &e {
                nom::Err::Error(err) | nom::Err::Failure(err) => err.input,
                nom::Err::Incomplete(_) => "",
            };
            Error::query(format!(
                "query syntax error near '{}'",
                near.chars().take(24).collect::<String>()
            ))
        })
}
