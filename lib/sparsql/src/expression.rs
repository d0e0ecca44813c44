//! In-process evaluation of the filter expressions not converted to SQL.

use crate::algebra::{Expression, Function};
use crate::binding::Binding;
use oxrdf::vocab::{rdf, xsd};
use oxrdf::{BlankNode, Literal, NamedNode, Term};
use oxsdatatypes::{Boolean, DateTime, Decimal, Double, Float, Integer};
use regex::{Regex, RegexBuilder};
use std::borrow::Cow;
use std::cmp::Ordering;
use std::rc::Rc;

const REGEX_SIZE_LIMIT: usize = 1_000_000;

/// A term with its literal value parsed according to its datatype.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum ExpressionTerm {
    NamedNode(NamedNode),
    BlankNode(BlankNode),
    StringLiteral(String),
    LangStringLiteral { value: String, language: String },
    BooleanLiteral(Boolean),
    IntegerLiteral(Integer),
    DecimalLiteral(Decimal),
    FloatLiteral(Float),
    DoubleLiteral(Double),
    DateTimeLiteral(DateTime),
    OtherTypedLiteral { value: String, datatype: NamedNode },
}

impl ExpressionTerm {
    /// [Effective boolean value](https://www.w3.org/TR/sparql11-query/#ebv), `None` on error.
    pub(crate) fn effective_boolean_value(&self) -> Option<bool> {
        match self {
            Self::BooleanLiteral(value) => Some((*value).into()),
            Self::StringLiteral(value) => Some(!value.is_empty()),
            Self::FloatLiteral(value) => Some(Boolean::from(*value).into()),
            Self::DoubleLiteral(value) => Some(Boolean::from(*value).into()),
            Self::IntegerLiteral(value) => Some(Boolean::from(*value).into()),
            Self::DecimalLiteral(value) => Some(Boolean::from(*value).into()),
            _ => None,
        }
    }
}

impl From<Term> for ExpressionTerm {
    fn from(term: Term) -> Self {
        match term {
            Term::NamedNode(t) => Self::NamedNode(t),
            Term::BlankNode(t) => Self::BlankNode(t),
            Term::Literal(t) => {
                let (value, datatype, language) = t.destruct();
                if let Some(language) = language {
                    Self::LangStringLiteral { value, language }
                } else if let Some(datatype) = datatype {
                    parse_typed_literal(&value, datatype.as_str())
                        .unwrap_or(Self::OtherTypedLiteral { value, datatype })
                } else {
                    Self::StringLiteral(value)
                }
            }
        }
    }
}

impl From<ExpressionTerm> for Term {
    fn from(term: ExpressionTerm) -> Self {
        match term {
            ExpressionTerm::NamedNode(t) => t.into(),
            ExpressionTerm::BlankNode(t) => t.into(),
            ExpressionTerm::StringLiteral(value) => Literal::from(value).into(),
            ExpressionTerm::LangStringLiteral { value, language } => {
                Literal::new_language_tagged_literal_unchecked(value, language).into()
            }
            ExpressionTerm::BooleanLiteral(value) => Literal::from(value).into(),
            ExpressionTerm::IntegerLiteral(value) => Literal::from(value).into(),
            ExpressionTerm::DecimalLiteral(value) => Literal::from(value).into(),
            ExpressionTerm::FloatLiteral(value) => Literal::from(value).into(),
            ExpressionTerm::DoubleLiteral(value) => Literal::from(value).into(),
            ExpressionTerm::DateTimeLiteral(value) => Literal::from(value).into(),
            ExpressionTerm::OtherTypedLiteral { value, datatype } => {
                Literal::new_typed_literal(value, datatype).into()
            }
        }
    }
}

impl From<bool> for ExpressionTerm {
    fn from(value: bool) -> Self {
        Self::BooleanLiteral(value.into())
    }
}

fn parse_typed_literal(value: &str, datatype: &str) -> Option<ExpressionTerm> {
    Some(match datatype {
        "http://www.w3.org/2001/XMLSchema#boolean" => {
            ExpressionTerm::BooleanLiteral(value.parse().ok()?)
        }
        "http://www.w3.org/2001/XMLSchema#string" => ExpressionTerm::StringLiteral(value.into()),
        "http://www.w3.org/2001/XMLSchema#float" => {
            ExpressionTerm::FloatLiteral(value.parse().ok()?)
        }
        "http://www.w3.org/2001/XMLSchema#double" => {
            ExpressionTerm::DoubleLiteral(value.parse().ok()?)
        }
        "http://www.w3.org/2001/XMLSchema#decimal" => {
            ExpressionTerm::DecimalLiteral(value.parse().ok()?)
        }
        "http://www.w3.org/2001/XMLSchema#integer"
        | "http://www.w3.org/2001/XMLSchema#byte"
        | "http://www.w3.org/2001/XMLSchema#short"
        | "http://www.w3.org/2001/XMLSchema#int"
        | "http://www.w3.org/2001/XMLSchema#long"
        | "http://www.w3.org/2001/XMLSchema#unsignedByte"
        | "http://www.w3.org/2001/XMLSchema#unsignedShort"
        | "http://www.w3.org/2001/XMLSchema#unsignedInt"
        | "http://www.w3.org/2001/XMLSchema#unsignedLong"
        | "http://www.w3.org/2001/XMLSchema#positiveInteger"
        | "http://www.w3.org/2001/XMLSchema#negativeInteger"
        | "http://www.w3.org/2001/XMLSchema#nonPositiveInteger"
        | "http://www.w3.org/2001/XMLSchema#nonNegativeInteger" => {
            ExpressionTerm::IntegerLiteral(value.parse().ok()?)
        }
        "http://www.w3.org/2001/XMLSchema#dateTime"
        | "http://www.w3.org/2001/XMLSchema#dateTimeStamp" => {
            ExpressionTerm::DateTimeLiteral(value.parse().ok()?)
        }
        _ => return None,
    })
}

/// A compiled expression, `None` is an evaluation error.
pub(crate) type ExpressionEvaluator = Rc<dyn Fn(&Binding) -> Option<ExpressionTerm>>;

/// Compiles a filter: a binding passes if the effective boolean value is true.
pub(crate) fn build_filter_evaluator(expression: &Expression) -> Rc<dyn Fn(&Binding) -> bool> {
    let evaluator = build_expression_evaluator(expression);
    Rc::new(move |binding| {
        evaluator(binding)
            .and_then(|t| t.effective_boolean_value())
            .unwrap_or(false)
    })
}

pub(crate) fn build_expression_evaluator(expression: &Expression) -> ExpressionEvaluator {
    match expression {
        Expression::NamedNode(t) => {
            let t = ExpressionTerm::from(Term::from(t.clone()));
            Rc::new(move |_| Some(t.clone()))
        }
        Expression::Literal(t) => {
            let t = ExpressionTerm::from(Term::from(t.clone()));
            Rc::new(move |_| Some(t.clone()))
        }
        Expression::Variable(v) => {
            let v = v.clone();
            Rc::new(move |binding| Some(binding.get(&v)?.clone().into()))
        }
        Expression::Bound(v) => {
            let v = v.clone();
            Rc::new(move |binding| Some(binding.contains(&v).into()))
        }
        Expression::Or(children) => {
            let children = children
                .iter()
                .map(build_expression_evaluator)
                .collect::<Vec<_>>();
            Rc::new(move |binding| {
                let mut error = false;
                for child in &children {
                    match child(binding).and_then(|e| e.effective_boolean_value()) {
                        Some(true) => return Some(true.into()),
                        Some(false) => (),
                        None => error = true,
                    }
                }
                if error { None } else { Some(false.into()) }
            })
        }
        Expression::And(children) => {
            let children = children
                .iter()
                .map(build_expression_evaluator)
                .collect::<Vec<_>>();
            Rc::new(move |binding| {
                let mut error = false;
                for child in &children {
                    match child(binding).and_then(|e| e.effective_boolean_value()) {
                        Some(true) => (),
                        Some(false) => return Some(false.into()),
                        None => error = true,
                    }
                }
                if error { None } else { Some(true.into()) }
            })
        }
        Expression::Not(e) => {
            let e = build_expression_evaluator(e);
            Rc::new(move |binding| Some((!e(binding)?.effective_boolean_value()?).into()))
        }
        Expression::Equal(a, b) => {
            let a = build_expression_evaluator(a);
            let b = build_expression_evaluator(b);
            Rc::new(move |binding| equals(&a(binding)?, &b(binding)?).map(Into::into))
        }
        Expression::SameTerm(a, b) => {
            let a = build_expression_evaluator(a);
            let b = build_expression_evaluator(b);
            Rc::new(move |binding| Some((a(binding)? == b(binding)?).into()))
        }
        Expression::Greater(a, b) => build_comparison(a, b, Ordering::is_gt),
        Expression::GreaterOrEqual(a, b) => build_comparison(a, b, Ordering::is_ge),
        Expression::Less(a, b) => build_comparison(a, b, Ordering::is_lt),
        Expression::LessOrEqual(a, b) => build_comparison(a, b, Ordering::is_le),
        Expression::Add(a, b) => build_arithmetic(
            a,
            b,
            |v1, v2| Some(v1 + v2),
            |v1, v2| Some(v1 + v2),
            |v1, v2| v1.checked_add(v2).map(ExpressionTerm::IntegerLiteral),
            |v1, v2| v1.checked_add(v2),
        ),
        Expression::Subtract(a, b) => build_arithmetic(
            a,
            b,
            |v1, v2| Some(v1 - v2),
            |v1, v2| Some(v1 - v2),
            |v1, v2| v1.checked_sub(v2).map(ExpressionTerm::IntegerLiteral),
            |v1, v2| v1.checked_sub(v2),
        ),
        Expression::Multiply(a, b) => build_arithmetic(
            a,
            b,
            |v1, v2| Some(v1 * v2),
            |v1, v2| Some(v1 * v2),
            |v1, v2| v1.checked_mul(v2).map(ExpressionTerm::IntegerLiteral),
            |v1, v2| v1.checked_mul(v2),
        ),
        Expression::Divide(a, b) => build_arithmetic(
            a,
            b,
            |v1, v2| Some(v1 / v2),
            |v1, v2| Some(v1 / v2),
            // The integer division gives a decimal
            |v1, v2| {
                Decimal::from(v1)
                    .checked_div(v2)
                    .map(ExpressionTerm::DecimalLiteral)
            },
            |v1, v2| v1.checked_div(v2),
        ),
        Expression::UnaryPlus(e) => {
            let e = build_expression_evaluator(e);
            Rc::new(move |binding| {
                let value = e(binding)?;
                is_numeric(&value).then_some(value)
            })
        }
        Expression::UnaryMinus(e) => {
            let e = build_expression_evaluator(e);
            Rc::new(move |binding| {
                Some(match e(binding)? {
                    ExpressionTerm::FloatLiteral(value) => ExpressionTerm::FloatLiteral(-value),
                    ExpressionTerm::DoubleLiteral(value) => ExpressionTerm::DoubleLiteral(-value),
                    ExpressionTerm::IntegerLiteral(value) => {
                        ExpressionTerm::IntegerLiteral(value.checked_neg()?)
                    }
                    ExpressionTerm::DecimalLiteral(value) => {
                        ExpressionTerm::DecimalLiteral(value.checked_neg()?)
                    }
                    _ => return None,
                })
            })
        }
        Expression::Coalesce(l) => {
            let l = l.iter().map(build_expression_evaluator).collect::<Vec<_>>();
            Rc::new(move |binding| l.iter().find_map(|e| e(binding)))
        }
        Expression::If(a, b, c) => {
            let a = build_expression_evaluator(a);
            let b = build_expression_evaluator(b);
            let c = build_expression_evaluator(c);
            Rc::new(move |binding| {
                if a(binding)?.effective_boolean_value()? {
                    b(binding)
                } else {
                    c(binding)
                }
            })
        }
        Expression::FunctionCall(function, parameters) => {
            build_function_evaluator(function, parameters)
        }
    }
}

fn build_function_evaluator(function: &Function, parameters: &[Expression]) -> ExpressionEvaluator {
    match (function, parameters) {
        (Function::Str, [e]) => {
            let e = build_expression_evaluator(e);
            Rc::new(move |binding| {
                Some(ExpressionTerm::StringLiteral(match e(binding)?.into() {
                    Term::NamedNode(term) => term.into_string(),
                    Term::BlankNode(_) => return None,
                    Term::Literal(term) => term.destruct().0,
                }))
            })
        }
        (Function::Lang, [e]) => {
            let e = build_expression_evaluator(e);
            Rc::new(move |binding| {
                Some(ExpressionTerm::StringLiteral(match e(binding)? {
                    ExpressionTerm::LangStringLiteral { language, .. } => language,
                    ExpressionTerm::NamedNode(_) | ExpressionTerm::BlankNode(_) => return None,
                    _ => String::new(),
                }))
            })
        }
        (Function::LangMatches, [language_tag, language_range]) => {
            let language_tag = build_expression_evaluator(language_tag);
            let language_range = build_expression_evaluator(language_range);
            Rc::new(move |binding| {
                let ExpressionTerm::StringLiteral(mut language_tag) = language_tag(binding)? else {
                    return None;
                };
                language_tag.make_ascii_lowercase();
                let ExpressionTerm::StringLiteral(mut language_range) = language_range(binding)?
                else {
                    return None;
                };
                language_range.make_ascii_lowercase();
                Some(
                    if language_range == "*" {
                        !language_tag.is_empty()
                    } else {
                        let mut tag_subtags = language_tag.split('-');
                        language_range
                            .split('-')
                            .all(|range_subtag| tag_subtags.next() == Some(range_subtag))
                    }
                    .into(),
                )
            })
        }
        (Function::Datatype, [e]) => {
            let e = build_expression_evaluator(e);
            Rc::new(move |binding| {
                Some(ExpressionTerm::NamedNode(match e(binding)? {
                    ExpressionTerm::StringLiteral(_) => xsd::STRING.into(),
                    ExpressionTerm::LangStringLiteral { .. } => rdf::LANG_STRING.into(),
                    ExpressionTerm::BooleanLiteral(_) => xsd::BOOLEAN.into(),
                    ExpressionTerm::IntegerLiteral(_) => xsd::INTEGER.into(),
                    ExpressionTerm::DecimalLiteral(_) => xsd::DECIMAL.into(),
                    ExpressionTerm::FloatLiteral(_) => xsd::FLOAT.into(),
                    ExpressionTerm::DoubleLiteral(_) => xsd::DOUBLE.into(),
                    ExpressionTerm::DateTimeLiteral(_) => xsd::DATE_TIME.into(),
                    ExpressionTerm::OtherTypedLiteral { datatype, .. } => datatype,
                    ExpressionTerm::NamedNode(_) | ExpressionTerm::BlankNode(_) => return None,
                }))
            })
        }
        (Function::Iri, [e]) => {
            let e = build_expression_evaluator(e);
            Rc::new(move |binding| {
                Some(ExpressionTerm::NamedNode(match e(binding)? {
                    ExpressionTerm::NamedNode(iri) => iri,
                    ExpressionTerm::StringLiteral(iri) => NamedNode::new(iri).ok()?,
                    _ => return None,
                }))
            })
        }
        (Function::StrLen, [e]) => {
            let e = build_expression_evaluator(e);
            Rc::new(move |binding| {
                let (value, _) = to_string_and_language(e(binding)?)?;
                Some(ExpressionTerm::IntegerLiteral(
                    i64::try_from(value.chars().count()).ok()?.into(),
                ))
            })
        }
        (Function::UCase, [e]) => {
            let e = build_expression_evaluator(e);
            Rc::new(move |binding| {
                let (value, language) = to_string_and_language(e(binding)?)?;
                Some(build_plain_literal(value.to_uppercase(), language))
            })
        }
        (Function::LCase, [e]) => {
            let e = build_expression_evaluator(e);
            Rc::new(move |binding| {
                let (value, language) = to_string_and_language(e(binding)?)?;
                Some(build_plain_literal(value.to_lowercase(), language))
            })
        }
        (Function::Contains, [a, b]) => build_string_test(a, b, |a, b| a.contains(b)),
        (Function::StrStarts, [a, b]) => build_string_test(a, b, |a, b| a.starts_with(b)),
        (Function::StrEnds, [a, b]) => build_string_test(a, b, |a, b| a.ends_with(b)),
        (Function::IsIri, [e]) => {
            let e = build_expression_evaluator(e);
            Rc::new(move |binding| {
                Some(matches!(e(binding)?, ExpressionTerm::NamedNode(_)).into())
            })
        }
        (Function::IsBlank, [e]) => {
            let e = build_expression_evaluator(e);
            Rc::new(move |binding| {
                Some(matches!(e(binding)?, ExpressionTerm::BlankNode(_)).into())
            })
        }
        (Function::IsLiteral, [e]) => {
            let e = build_expression_evaluator(e);
            Rc::new(move |binding| {
                Some(
                    (!matches!(
                        e(binding)?,
                        ExpressionTerm::NamedNode(_) | ExpressionTerm::BlankNode(_)
                    ))
                    .into(),
                )
            })
        }
        (Function::IsNumeric, [e]) => {
            let e = build_expression_evaluator(e);
            Rc::new(move |binding| Some(is_numeric(&e(binding)?).into()))
        }
        (Function::Regex, [text, pattern, flags @ ..]) if flags.len() <= 1 => {
            let text = build_expression_evaluator(text);
            if let Some(regex) = compile_static_pattern_if_exists(pattern, flags.first()) {
                Rc::new(move |binding| {
                    let (text, _) = to_string_and_language(text(binding)?)?;
                    Some(regex.is_match(&text).into())
                })
            } else {
                let pattern = build_expression_evaluator(pattern);
                let flags = flags.first().map(build_expression_evaluator);
                Rc::new(move |binding| {
                    let ExpressionTerm::StringLiteral(pattern) = pattern(binding)? else {
                        return None;
                    };
                    let options = if let Some(flags) = &flags {
                        let ExpressionTerm::StringLiteral(options) = flags(binding)? else {
                            return None;
                        };
                        Some(options)
                    } else {
                        None
                    };
                    let regex = compile_pattern(&pattern, options.as_deref())?;
                    let (text, _) = to_string_and_language(text(binding)?)?;
                    Some(regex.is_match(&text).into())
                })
            }
        }
        // Wrong arity
        _ => Rc::new(|_| None),
    }
}

fn build_comparison(
    a: &Expression,
    b: &Expression,
    test: fn(Ordering) -> bool,
) -> ExpressionEvaluator {
    let a = build_expression_evaluator(a);
    let b = build_expression_evaluator(b);
    Rc::new(move |binding| Some(test(partial_cmp(&a(binding)?, &b(binding)?)?).into()))
}

fn build_arithmetic(
    a: &Expression,
    b: &Expression,
    float: fn(Float, Float) -> Option<Float>,
    double: fn(Double, Double) -> Option<Double>,
    integer: fn(Integer, Integer) -> Option<ExpressionTerm>,
    decimal: fn(Decimal, Decimal) -> Option<Decimal>,
) -> ExpressionEvaluator {
    let a = build_expression_evaluator(a);
    let b = build_expression_evaluator(b);
    Rc::new(move |binding| {
        Some(match NumericBinaryOperands::new(a(binding)?, b(binding)?)? {
            NumericBinaryOperands::Float(v1, v2) => ExpressionTerm::FloatLiteral(float(v1, v2)?),
            NumericBinaryOperands::Double(v1, v2) => {
                ExpressionTerm::DoubleLiteral(double(v1, v2)?)
            }
            NumericBinaryOperands::Integer(v1, v2) => integer(v1, v2)?,
            NumericBinaryOperands::Decimal(v1, v2) => {
                ExpressionTerm::DecimalLiteral(decimal(v1, v2)?)
            }
        })
    })
}

fn build_string_test(
    a: &Expression,
    b: &Expression,
    test: fn(&str, &str) -> bool,
) -> ExpressionEvaluator {
    let a = build_expression_evaluator(a);
    let b = build_expression_evaluator(b);
    Rc::new(move |binding| {
        let (a, b, _) = to_argument_compatible_strings(a(binding)?, b(binding)?)?;
        Some(test(&a, &b).into())
    })
}

fn is_numeric(term: &ExpressionTerm) -> bool {
    matches!(
        term,
        ExpressionTerm::IntegerLiteral(_)
            | ExpressionTerm::DecimalLiteral(_)
            | ExpressionTerm::FloatLiteral(_)
            | ExpressionTerm::DoubleLiteral(_)
    )
}

fn to_string_and_language(term: ExpressionTerm) -> Option<(String, Option<String>)> {
    match term {
        ExpressionTerm::StringLiteral(value) => Some((value, None)),
        ExpressionTerm::LangStringLiteral { value, language } => Some((value, Some(language))),
        _ => None,
    }
}

fn build_plain_literal(value: String, language: Option<String>) -> ExpressionTerm {
    if let Some(language) = language {
        ExpressionTerm::LangStringLiteral { value, language }
    } else {
        ExpressionTerm::StringLiteral(value)
    }
}

fn to_argument_compatible_strings(
    arg1: ExpressionTerm,
    arg2: ExpressionTerm,
) -> Option<(String, String, Option<String>)> {
    let (value1, language1) = to_string_and_language(arg1)?;
    let (value2, language2) = to_string_and_language(arg2)?;
    (language2.is_none() || language1 == language2).then_some((value1, value2, language1))
}

fn compile_static_pattern_if_exists(
    pattern: &Expression,
    options: Option<&Expression>,
) -> Option<Regex> {
    let Expression::Literal(pattern) = pattern else {
        return None;
    };
    if pattern.datatype() != xsd::STRING {
        return None;
    }
    let options = match options {
        Some(Expression::Literal(options)) if options.datatype() == xsd::STRING => {
            Some(options.value())
        }
        Some(_) => return None,
        None => None,
    };
    compile_pattern(pattern.value(), options)
}

fn compile_pattern(pattern: &str, flags: Option<&str>) -> Option<Regex> {
    let mut pattern = Cow::Borrowed(pattern);
    let flags = flags.unwrap_or_default();
    if flags.contains('q') {
        pattern = regex::escape(&pattern).into();
    }
    let mut regex_builder = RegexBuilder::new(&pattern);
    regex_builder.size_limit(REGEX_SIZE_LIMIT);
    for flag in flags.chars() {
        match flag {
            's' => {
                regex_builder.dot_matches_new_line(true);
            }
            'm' => {
                regex_builder.multi_line(true);
            }
            'i' => {
                regex_builder.case_insensitive(true);
            }
            'x' => {
                regex_builder.ignore_whitespace(true);
            }
            'q' => (),
            _ => return None,
        }
    }
    regex_builder.build().ok()
}

/// Equality operator (=)
fn equals(a: &ExpressionTerm, b: &ExpressionTerm) -> Option<bool> {
    match a {
        ExpressionTerm::NamedNode(_)
        | ExpressionTerm::BlankNode(_)
        | ExpressionTerm::LangStringLiteral { .. } => Some(a == b),
        ExpressionTerm::StringLiteral(a) => match b {
            ExpressionTerm::StringLiteral(b) => Some(a == b),
            ExpressionTerm::OtherTypedLiteral { .. } => None,
            _ => Some(false),
        },
        ExpressionTerm::OtherTypedLiteral { .. } => match b {
            ExpressionTerm::OtherTypedLiteral { .. } if a == b => Some(true),
            ExpressionTerm::NamedNode(_)
            | ExpressionTerm::BlankNode(_)
            | ExpressionTerm::LangStringLiteral { .. } => Some(false),
            _ => None,
        },
        ExpressionTerm::BooleanLiteral(a) => match b {
            ExpressionTerm::BooleanLiteral(b) => Some(a == b),
            ExpressionTerm::OtherTypedLiteral { .. } => None,
            _ => Some(false),
        },
        ExpressionTerm::FloatLiteral(_)
        | ExpressionTerm::DoubleLiteral(_)
        | ExpressionTerm::IntegerLiteral(_)
        | ExpressionTerm::DecimalLiteral(_) => match b {
            ExpressionTerm::OtherTypedLiteral { .. } => None,
            _ => Some(
                NumericBinaryOperands::new(a.clone(), b.clone())
                    .is_some_and(|operands| operands.compare() == Some(Ordering::Equal)),
            ),
        },
        ExpressionTerm::DateTimeLiteral(a) => match b {
            ExpressionTerm::DateTimeLiteral(b) => Some(a == b),
            ExpressionTerm::OtherTypedLiteral { .. } => None,
            _ => Some(false),
        },
    }
}

/// Comparison for <, >, <= and >= operators
fn partial_cmp(a: &ExpressionTerm, b: &ExpressionTerm) -> Option<Ordering> {
    if a == b {
        return Some(Ordering::Equal);
    }
    partial_cmp_literals(a, b)
}

fn partial_cmp_literals(a: &ExpressionTerm, b: &ExpressionTerm) -> Option<Ordering> {
    match (a, b) {
        (ExpressionTerm::StringLiteral(a), ExpressionTerm::StringLiteral(b)) => a.partial_cmp(b),
        (
            ExpressionTerm::LangStringLiteral {
                value: va,
                language: la,
            },
            ExpressionTerm::LangStringLiteral {
                value: vb,
                language: lb,
            },
        ) => {
            if la == lb {
                va.partial_cmp(vb)
            } else {
                None
            }
        }
        (ExpressionTerm::BooleanLiteral(a), ExpressionTerm::BooleanLiteral(b)) => {
            a.partial_cmp(b)
        }
        (ExpressionTerm::DateTimeLiteral(a), ExpressionTerm::DateTimeLiteral(b)) => {
            a.partial_cmp(b)
        }
        _ => NumericBinaryOperands::new(a.clone(), b.clone())?.compare(),
    }
}

/// The total order used by `ORDER BY`: unbound, blank nodes, IRIs, then literals.
pub(crate) fn cmp_terms(a: Option<&ExpressionTerm>, b: Option<&ExpressionTerm>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => match a {
            ExpressionTerm::BlankNode(a) => match b {
                ExpressionTerm::BlankNode(b) => a.as_str().cmp(b.as_str()),
                _ => Ordering::Less,
            },
            ExpressionTerm::NamedNode(a) => match b {
                ExpressionTerm::BlankNode(_) => Ordering::Greater,
                ExpressionTerm::NamedNode(b) => a.as_str().cmp(b.as_str()),
                _ => Ordering::Less,
            },
            _ => match b {
                ExpressionTerm::NamedNode(_) | ExpressionTerm::BlankNode(_) => Ordering::Greater,
                _ => {
                    if let Some(ord) = partial_cmp_literals(a, b) {
                        ord
                    } else if let (Term::Literal(a), Term::Literal(b)) =
                        (a.clone().into(), b.clone().into())
                    {
                        (a.value(), a.datatype(), a.language()).cmp(&(
                            b.value(),
                            b.datatype(),
                            b.language(),
                        ))
                    } else {
                        Ordering::Equal
                    }
                }
            },
        },
        (Some(_), None) => Ordering::Greater,
        (None, Some(_)) => Ordering::Less,
        (None, None) => Ordering::Equal,
    }
}

/// Numeric operands promoted to a common type.
enum NumericBinaryOperands {
    Float(Float, Float),
    Double(Double, Double),
    Integer(Integer, Integer),
    Decimal(Decimal, Decimal),
}

impl NumericBinaryOperands {
    fn new(a: ExpressionTerm, b: ExpressionTerm) -> Option<Self> {
        match (a, b) {
            (ExpressionTerm::FloatLiteral(v1), ExpressionTerm::FloatLiteral(v2)) => {
                Some(Self::Float(v1, v2))
            }
            (ExpressionTerm::FloatLiteral(v1), ExpressionTerm::DoubleLiteral(v2)) => {
                Some(Self::Double(v1.into(), v2))
            }
            (ExpressionTerm::FloatLiteral(v1), ExpressionTerm::IntegerLiteral(v2)) => {
                Some(Self::Float(v1, v2.into()))
            }
            (ExpressionTerm::FloatLiteral(v1), ExpressionTerm::DecimalLiteral(v2)) => {
                Some(Self::Float(v1, v2.into()))
            }
            (ExpressionTerm::DoubleLiteral(v1), ExpressionTerm::FloatLiteral(v2)) => {
                Some(Self::Double(v1, v2.into()))
            }
            (ExpressionTerm::DoubleLiteral(v1), ExpressionTerm::DoubleLiteral(v2)) => {
                Some(Self::Double(v1, v2))
            }
            (ExpressionTerm::DoubleLiteral(v1), ExpressionTerm::IntegerLiteral(v2)) => {
                Some(Self::Double(v1, v2.into()))
            }
            (ExpressionTerm::DoubleLiteral(v1), ExpressionTerm::DecimalLiteral(v2)) => {
                Some(Self::Double(v1, v2.into()))
            }
            (ExpressionTerm::IntegerLiteral(v1), ExpressionTerm::FloatLiteral(v2)) => {
                Some(Self::Float(v1.into(), v2))
            }
            (ExpressionTerm::IntegerLiteral(v1), ExpressionTerm::DoubleLiteral(v2)) => {
                Some(Self::Double(v1.into(), v2))
            }
            (ExpressionTerm::IntegerLiteral(v1), ExpressionTerm::IntegerLiteral(v2)) => {
                Some(Self::Integer(v1, v2))
            }
            (ExpressionTerm::IntegerLiteral(v1), ExpressionTerm::DecimalLiteral(v2)) => {
                Some(Self::Decimal(v1.into(), v2))
            }
            (ExpressionTerm::DecimalLiteral(v1), ExpressionTerm::FloatLiteral(v2)) => {
                Some(Self::Float(v1.into(), v2))
            }
            (ExpressionTerm::DecimalLiteral(v1), ExpressionTerm::DoubleLiteral(v2)) => {
                Some(Self::Double(v1.into(), v2))
            }
            (ExpressionTerm::DecimalLiteral(v1), ExpressionTerm::IntegerLiteral(v2)) => {
                Some(Self::Decimal(v1, v2.into()))
            }
            (ExpressionTerm::DecimalLiteral(v1), ExpressionTerm::DecimalLiteral(v2)) => {
                Some(Self::Decimal(v1, v2))
            }
            _ => None,
        }
    }

    fn compare(&self) -> Option<Ordering> {
        match self {
            Self::Float(v1, v2) => v1.partial_cmp(v2),
            Self::Double(v1, v2) => v1.partial_cmp(v2),
            Self::Integer(v1, v2) => v1.partial_cmp(v2),
            Self::Decimal(v1, v2) => v1.partial_cmp(v2),
        }
    }
}
