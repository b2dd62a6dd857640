use lazy_static::lazy_static;
use nom::{
    branch::alt,
    bytes::complete::{tag, tag_no_case, take_while, take_while1},
    character::complete::{alphanumeric1, char, digit1, multispace0},
    combinator::{all_consuming, map, map_res, not, opt, recognize, verify},
    multi::{fold_many0, many0, separated_list0},
    sequence::{delimited, pair, preceded, terminated, tuple},
    IResult,
};
use regex::Regex;
use std::str::FromStr;

use crate::core::{JdbcType, Value};
use crate::statement::{CompareOp, Expr, Operand, ParameterMapping, ParameterMode};

lazy_static! {
    static ref PLACEHOLDER_REGEX: Regex = Regex::new(r"#\{([^}]*)\}").expect("placeholder regex");
}

pub fn ws<'a, F, O>(inner: F) -> impl FnMut(&'a str) -> IResult<&'a str, O>
where
    F: FnMut(&'a str) -> IResult<&'a str, O>,
{
    delimited(multispace0, inner, multispace0)
}

fn identifier(input: &str) -> IResult<&str, String> {
    map(
        recognize(pair(
            take_while1(|c: char| c.is_alphabetic() || c == '_'),
            take_while(|c: char| c.is_alphanumeric() || c == '_'),
        )),
        |s: &str| s.to_string(),
    )(input)
}

/// Property reference, possibly dotted (`user.address.city`).
fn property_path(input: &str) -> IResult<&str, String> {
    map(
        recognize(pair(
            identifier,
            many0(pair(char('.'), identifier)),
        )),
        |s: &str| s.to_string(),
    )(input)
}

/// Identifier that is not an expression keyword, used for property and
/// helper references to avoid conflicts with AND/OR/NOT and literals.
fn non_keyword_path(input: &str) -> IResult<&str, String> {
    verify(property_path, |s: &String| {
        !matches!(
            s.to_ascii_lowercase().as_str(),
            "and" | "or" | "not" | "null" | "true" | "false"
        )
    })(input)
}

fn keyword<'a>(kw: &'static str) -> impl FnMut(&'a str) -> IResult<&'a str, &'a str> {
    terminated(tag_no_case(kw), not(alt((alphanumeric1, tag("_")))))
}

fn string_literal(input: &str) -> IResult<&str, Value> {
    map(
        delimited(char('\''), take_while(|c| c != '\''), char('\'')),
        |s: &str| Value::Text(s.to_string()),
    )(input)
}

fn number_literal(input: &str) -> IResult<&str, Value> {
    alt((
        map_res(
            recognize(tuple((opt(char('-')), digit1, char('.'), digit1))),
            |s: &str| s.parse::<f64>().map(Value::Real),
        ),
        map_res(recognize(pair(opt(char('-')), digit1)), |s: &str| {
            s.parse::<i64>().map(Value::Integer)
        }),
    ))(input)
}

fn keyword_literal(input: &str) -> IResult<&str, Value> {
    alt((
        map(keyword("null"), |_| Value::Null),
        map(keyword("true"), |_| Value::Boolean(true)),
        map(keyword("false"), |_| Value::Boolean(false)),
    ))(input)
}

fn operand(input: &str) -> IResult<&str, Operand> {
    alt((
        map(alt((keyword_literal, string_literal, number_literal)), Operand::Literal),
        call_or_property,
    ))(input)
}

/// Helper call (`isNotEmpty(name)`) or bare property reference.
fn call_or_property(input: &str) -> IResult<&str, Operand> {
    let (rest, path) = non_keyword_path(input)?;
    let trimmed = rest.trim_start();
    if trimmed.starts_with('(') {
        let (rest, args) = delimited(
            ws(char('(')),
            separated_list0(ws(char(',')), operand),
            ws(char(')')),
        )(rest)?;
        Ok((rest, Operand::Call { helper: path, args }))
    } else {
        Ok((rest, Operand::Property(path)))
    }
}

fn compare_op(input: &str) -> IResult<&str, CompareOp> {
    alt((
        map(tag("=="), |_| CompareOp::Eq),
        map(tag("!="), |_| CompareOp::Ne),
        map(tag("<>"), |_| CompareOp::Ne),
        map(tag(">="), |_| CompareOp::Ge),
        map(tag("<="), |_| CompareOp::Le),
        map(tag(">"), |_| CompareOp::Gt),
        map(tag("<"), |_| CompareOp::Lt),
        map(tag("="), |_| CompareOp::Eq),
    ))(input)
}

fn cmp_expr(input: &str) -> IResult<&str, Expr> {
    alt((
        delimited(ws(char('(')), expression, ws(char(')'))),
        map(
            tuple((ws(operand), opt(pair(ws(compare_op), ws(operand))))),
            |(left, rest)| match rest {
                Some((op, right)) => Expr::Compare { left, op, right },
                None => Expr::Truthy(left),
            },
        ),
    ))(input)
}

fn not_expr(input: &str) -> IResult<&str, Expr> {
    alt((
        map(
            preceded(ws(alt((tag("!"), keyword("not")))), not_expr),
            |inner| Expr::Not(Box::new(inner)),
        ),
        cmp_expr,
    ))(input)
}

fn and_expr(input: &str) -> IResult<&str, Expr> {
    let (input, first) = not_expr(input)?;
    fold_many0(
        preceded(ws(keyword("and")), not_expr),
        move || first.clone(),
        |acc, next| Expr::And(Box::new(acc), Box::new(next)),
    )(input)
}

fn expression(input: &str) -> IResult<&str, Expr> {
    let (input, first) = and_expr(input)?;
    fold_many0(
        preceded(ws(keyword("or")), and_expr),
        move || first.clone(),
        |acc, next| Expr::Or(Box::new(acc), Box::new(next)),
    )(input)
}

/// Parse a `test="..."` attribute into an expression AST. Runs at compile
/// time so malformed expressions fail the boot, not the request.
pub fn parse_test_expression(input: &str) -> Result<Expr, String> {
    all_consuming(ws(expression))(input)
        .map(|(_, expr)| expr)
        .map_err(|e| format!("Unparsable test expression '{input}': {e:?}"))
}

/// Contents of one `#{...}` placeholder: property plus optional
/// `jdbcType=`/`mode=` attributes.
pub fn parse_placeholder(input: &str) -> Result<ParameterMapping, String> {
    let (_, (property, attrs)) = all_consuming(tuple((
        ws(property_path),
        many0(preceded(ws(char(',')), placeholder_attr)),
    )))(input)
    .map_err(|e| format!("Unparsable placeholder '#{{{input}}}': {e:?}"))?;

    let mut jdbc_type = None;
    let mut mode = ParameterMode::In;
    for (name, value) in attrs {
        match name.as_str() {
            "jdbcType" => {
                jdbc_type = Some(JdbcType::from_str(&value)?);
            }
            "mode" => {
                mode = ParameterMode::from_str(&value)?;
            }
            other => return Err(format!("Unknown placeholder attribute '{other}'")),
        }
    }
    Ok(ParameterMapping::new(property, jdbc_type, mode))
}

fn placeholder_attr(input: &str) -> IResult<&str, (String, String)> {
    pair(identifier, preceded(ws(char('=')), identifier))(input)
}

/// Compile one text chunk: collapse whitespace, replace each `#{...}` with
/// `?`, and record its mapping in placeholder order. Metadata from a
/// same-named declared `<parameter>` fills in anything the inline form
/// omits.
pub fn compile_text_chunk(
    text: &str,
    declared: &[ParameterMapping],
) -> Result<(String, Vec<ParameterMapping>), String> {
    let normalized = text.split_whitespace().collect::<Vec<_>>().join(" ");
    let mut params = Vec::new();
    let mut sql = String::with_capacity(normalized.len());
    let mut last_end = 0;

    for capture in PLACEHOLDER_REGEX.captures_iter(&normalized) {
        let whole = capture.get(0).expect("capture 0");
        let inner = capture.get(1).expect("capture 1").as_str();
        sql.push_str(&normalized[last_end..whole.start()]);
        sql.push('?');
        last_end = whole.end();

        let mut mapping = parse_placeholder(inner)?;
        if let Some(decl) = declared.iter().find(|d| d.property == mapping.property) {
            if mapping.jdbc_type.is_none() {
                mapping.jdbc_type = decl.jdbc_type;
            }
            if mapping.mode == ParameterMode::In {
                mapping.mode = decl.mode;
            }
        }
        params.push(mapping);
    }
    sql.push_str(&normalized[last_end..]);
    Ok((sql, params))
}
