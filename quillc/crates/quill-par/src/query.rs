//! Query parsing: `from`, `exists` and `forall` pipelines.
//!
//! A query opens with comma-separated scans (`pat in source` or
//! `pat = scalar`), then carries any number of steps. Step keywords are
//! reserved words, so the expression inside a step stops cleanly at the
//! next step keyword. `require` is only legal inside `forall`, and a
//! `forall` without `require` is a syntax error - the step supplies the
//! proposition the quantifier asserts.

use crate::ast::*;
use crate::{ParseError, Parser};
use quill_lex::Token;

impl Parser {
    /// Parse a `from`/`exists`/`forall` expression; the caller has seen
    /// (not consumed) the opening keyword.
    pub(crate) fn parse_query(&mut self) -> Result<Expr, ParseError> {
        let start = self.pos();
        let head = self.advance();
        let mut steps = Vec::new();

        // Opening scans, if the first token can start a pattern.
        if self.at_atomic_pat_start() {
            loop {
                steps.push(self.parse_scan()?);
                if !self.eat(&Token::Comma) {
                    break;
                }
            }
        }

        let mut require: Option<Expr> = None;
        loop {
            let step_start = self.pos();
            let kind = match self.peek() {
                Token::Where => {
                    self.advance();
                    StepKind::Where(self.parse_expr()?)
                }
                Token::Join => {
                    self.advance();
                    let (pat, source, on) = self.parse_scan_parts()?;
                    StepKind::Join { pat, source, on }
                }
                Token::Group => {
                    self.advance();
                    let key = self.parse_expr()?;
                    let compute = if self.eat(&Token::Compute) {
                        Some(self.parse_expr()?)
                    } else {
                        None
                    };
                    StepKind::Group { key, compute }
                }
                Token::Compute => {
                    self.advance();
                    StepKind::Compute(self.parse_expr()?)
                }
                Token::Order => {
                    self.advance();
                    StepKind::Order(self.parse_expr()?)
                }
                Token::Take => {
                    self.advance();
                    StepKind::Take(self.parse_expr()?)
                }
                Token::Skip => {
                    self.advance();
                    StepKind::Skip(self.parse_expr()?)
                }
                Token::Yield => {
                    self.advance();
                    StepKind::Yield(self.parse_expr()?)
                }
                Token::Into => {
                    self.advance();
                    StepKind::Into(self.parse_expr()?)
                }
                Token::Through => {
                    self.advance();
                    let pat = self.parse_pat()?;
                    self.expect(&Token::In)?;
                    let exp = self.parse_expr()?;
                    StepKind::Through { pat, exp }
                }
                Token::Distinct => {
                    self.advance();
                    StepKind::Distinct
                }
                Token::Unorder => {
                    self.advance();
                    StepKind::Unorder
                }
                Token::Union => {
                    self.advance();
                    let (distinct, sources) = self.parse_setop_args()?;
                    StepKind::Union { distinct, sources }
                }
                Token::Intersect => {
                    self.advance();
                    let (distinct, sources) = self.parse_setop_args()?;
                    StepKind::Intersect { distinct, sources }
                }
                Token::Except => {
                    self.advance();
                    let (distinct, sources) = self.parse_setop_args()?;
                    StepKind::Except { distinct, sources }
                }
                Token::Require => {
                    let pos = self.pos();
                    self.advance();
                    let cond = self.parse_expr()?;
                    if matches!(head, Token::Forall) {
                        require = Some(cond);
                        continue;
                    }
                    return Err(ParseError::RequireOutsideForall { pos });
                }
                _ => break,
            };
            steps.push(Step {
                kind,
                pos: step_start.merge(self.prev_pos()),
            });
        }

        let pos = start.merge(self.prev_pos());
        match head {
            Token::From => Ok(Expr::new(ExprKind::From(steps), pos)),
            Token::Exists => Ok(Expr::new(ExprKind::Exists(steps), pos)),
            Token::Forall => match require {
                Some(cond) => Ok(Expr::new(ExprKind::Forall(steps, Box::new(cond)), pos)),
                None => Err(ParseError::ForallWithoutRequire { pos }),
            },
            _ => unreachable!(),
        }
    }

    /// `pat (in|=) source [on cond]` as an opening scan step
    fn parse_scan(&mut self) -> Result<Step, ParseError> {
        let start = self.pos();
        let (pat, source, on) = self.parse_scan_parts()?;
        Ok(Step {
            kind: StepKind::Scan { pat, source, on },
            pos: start.merge(self.prev_pos()),
        })
    }

    /// The shared body of scan and join steps
    fn parse_scan_parts(&mut self) -> Result<(Pat, ScanSource, Option<Expr>), ParseError> {
        let pat = self.parse_pat()?;
        let source = if self.eat(&Token::In) {
            ScanSource::In(self.parse_expr()?)
        } else if self.eat(&Token::Eq) {
            ScanSource::Eq(self.parse_expr()?)
        } else {
            return Err(self.unexpected("'in' or '='"));
        };
        let on = if self.eat(&Token::On) {
            Some(self.parse_expr()?)
        } else {
            None
        };
        Ok((pat, source, on))
    }

    /// `[distinct] e1, e2, …` after a set-operation keyword
    fn parse_setop_args(&mut self) -> Result<(bool, Vec<Expr>), ParseError> {
        let distinct = self.eat(&Token::Distinct);
        let mut sources = vec![self.parse_expr()?];
        while self.eat(&Token::Comma) {
            sources.push(self.parse_expr()?);
        }
        Ok((distinct, sources))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Statement;
    use quill_util::FileId;

    fn parse_expr(source: &str) -> Expr {
        match Parser::parse_single(source, FileId::STDIN).unwrap() {
            Statement::Expr(e) => e,
            other => panic!("expected expression, got {:?}", other),
        }
    }

    fn steps_of(exp: &Expr) -> &[Step] {
        match &exp.kind {
            ExprKind::From(steps) => steps,
            other => panic!("expected from, got {:?}", other),
        }
    }

    #[test]
    fn test_simple_pipeline() {
        let exp = parse_expr("from e in emps where #deptno e = 10 yield #id e;");
        let steps = steps_of(&exp);
        assert_eq!(steps.len(), 3);
        assert!(matches!(steps[0].kind, StepKind::Scan { .. }));
        assert!(matches!(steps[1].kind, StepKind::Where(_)));
        assert!(matches!(steps[2].kind, StepKind::Yield(_)));
    }

    #[test]
    fn test_multiple_scans() {
        let exp = parse_expr("from e in emps, d in depts where e.deptno = d.deptno;");
        let steps = steps_of(&exp);
        assert!(matches!(steps[0].kind, StepKind::Scan { .. }));
        assert!(matches!(steps[1].kind, StepKind::Scan { .. }));
        assert!(matches!(steps[2].kind, StepKind::Where(_)));
    }

    #[test]
    fn test_scalar_scan() {
        let exp = parse_expr("from x = 1 yield x + 1;");
        match &steps_of(&exp)[0].kind {
            StepKind::Scan { source, .. } => assert!(matches!(source, ScanSource::Eq(_))),
            other => panic!("expected scan, got {:?}", other),
        }
    }

    #[test]
    fn test_join_with_on() {
        let exp = parse_expr("from e in emps join d in depts on e.deptno = d.deptno;");
        let steps = steps_of(&exp);
        match &steps[1].kind {
            StepKind::Join { on, .. } => assert!(on.is_some()),
            other => panic!("expected join, got {:?}", other),
        }
    }

    #[test]
    fn test_group_with_compute() {
        let exp = parse_expr("from e in emps group e.deptno compute sum over e.sal;");
        match &steps_of(&exp)[1].kind {
            StepKind::Group { compute, .. } => assert!(compute.is_some()),
            other => panic!("expected group, got {:?}", other),
        }
    }

    #[test]
    fn test_group_without_compute() {
        let exp = parse_expr("from e in emps group e.deptno;");
        match &steps_of(&exp)[1].kind {
            StepKind::Group { compute, .. } => assert!(compute.is_none()),
            other => panic!("expected group, got {:?}", other),
        }
    }

    #[test]
    fn test_order_take_skip_distinct_unorder() {
        let exp = parse_expr("from e in emps order e.sal skip 2 take 3 distinct unorder;");
        let kinds: Vec<_> = steps_of(&exp).iter().map(|s| &s.kind).collect();
        assert!(matches!(kinds[1], StepKind::Order(_)));
        assert!(matches!(kinds[2], StepKind::Skip(_)));
        assert!(matches!(kinds[3], StepKind::Take(_)));
        assert!(matches!(kinds[4], StepKind::Distinct));
        assert!(matches!(kinds[5], StepKind::Unorder));
    }

    #[test]
    fn test_into_step() {
        let exp = parse_expr("from e in emps into length;");
        assert!(matches!(
            steps_of(&exp).last().unwrap().kind,
            StepKind::Into(_)
        ));
    }

    #[test]
    fn test_through_step() {
        let exp = parse_expr("from e in emps through x in topN;");
        assert!(matches!(
            steps_of(&exp)[1].kind,
            StepKind::Through { .. }
        ));
    }

    #[test]
    fn test_union_distinct() {
        let exp = parse_expr("from e in xs union distinct ys, zs;");
        match &steps_of(&exp)[1].kind {
            StepKind::Union { distinct, sources } => {
                assert!(*distinct);
                assert_eq!(sources.len(), 2);
            }
            other => panic!("expected union, got {:?}", other),
        }
    }

    #[test]
    fn test_compute_step() {
        let exp = parse_expr("from e in emps compute count over e;");
        assert!(matches!(steps_of(&exp)[1].kind, StepKind::Compute(_)));
    }

    #[test]
    fn test_exists() {
        let exp = parse_expr("exists e in emps where e.deptno = 10;");
        assert!(matches!(exp.kind, ExprKind::Exists(_)));
    }

    #[test]
    fn test_forall_with_require() {
        let exp = parse_expr("forall e in emps require e.sal > 0;");
        match exp.kind {
            ExprKind::Forall(steps, cond) => {
                assert_eq!(steps.len(), 1);
                assert!(matches!(cond.kind, ExprKind::Infix(BinOp::Gt, _, _)));
            }
            other => panic!("expected forall, got {:?}", other),
        }
    }

    #[test]
    fn test_forall_without_require_is_error() {
        let err = Parser::parse_single("forall e in emps where e.sal > 0;", FileId::STDIN)
            .unwrap_err();
        assert!(matches!(err, ParseError::ForallWithoutRequire { .. }));
    }

    #[test]
    fn test_require_outside_forall_is_error() {
        let err =
            Parser::parse_single("from e in emps require e.sal > 0;", FileId::STDIN).unwrap_err();
        assert!(matches!(err, ParseError::RequireOutsideForall { .. }));
    }

    #[test]
    fn test_empty_from_yields() {
        // `from` with no scans is a single-row pipeline.
        let exp = parse_expr("from yield 1;");
        let steps = steps_of(&exp);
        assert_eq!(steps.len(), 1);
        assert!(matches!(steps[0].kind, StepKind::Yield(_)));
    }

    #[test]
    fn test_query_nested_in_expression() {
        let exp = parse_expr("(from e in emps yield e.sal) @ [0];");
        assert!(matches!(exp.kind, ExprKind::Infix(BinOp::Append, _, _)));
    }
}
