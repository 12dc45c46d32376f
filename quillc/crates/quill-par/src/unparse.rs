//! Unparser: render an AST back to source text.
//!
//! Used by the REPL's `--echo` mode and as the canonical-source half of
//! the compiled-statement cache key, so the output must be deterministic
//! for a given tree. Parenthesization is precedence-aware: a
//! subexpression is wrapped exactly when its level is looser than its
//! context requires, which keeps `1 + 2 * 3` round-trippable without
//! noise parens.

use crate::ast::*;
use std::fmt::Write;

/// Render a statement to canonical source (no trailing `;`)
pub fn statement(stmt: &Statement) -> String {
    match stmt {
        Statement::Decl(d) => decl(d),
        Statement::Expr(e) => expr(e),
    }
}

/// Render an expression
pub fn expr(e: &Expr) -> String {
    let mut out = String::new();
    write_expr(&mut out, e);
    out
}

/// Render a pattern
pub fn pat(p: &Pat) -> String {
    let mut out = String::new();
    write_pat(&mut out, p, false);
    out
}

/// Render a declaration
pub fn decl(d: &Decl) -> String {
    let mut out = String::new();
    write_decl(&mut out, d);
    out
}

/// Render a type expression
pub fn type_exp(t: &TypeExp) -> String {
    let mut out = String::new();
    write_type(&mut out, t, 0);
    out
}

fn op_level(op: BinOp) -> u8 {
    match op {
        BinOp::Implies => 0,
        BinOp::Orelse => 1,
        BinOp::Andalso => 2,
        BinOp::Compose => 3,
        BinOp::Eq
        | BinOp::Ne
        | BinOp::Lt
        | BinOp::Le
        | BinOp::Gt
        | BinOp::Ge
        | BinOp::Elem
        | BinOp::Notelem => 4,
        BinOp::Cons | BinOp::Append => 5,
        BinOp::Plus | BinOp::Minus | BinOp::Concat => 6,
        BinOp::Times | BinOp::Divide | BinOp::Div | BinOp::Mod => 7,
    }
}

/// Precedence of an expression form, for parenthesization decisions;
/// closed forms (`let`, literals, tuples) never need parens themselves
fn expr_level(e: &Expr) -> u8 {
    match &e.kind {
        ExprKind::Infix(op, _, _) => op_level(*op),
        ExprKind::If(_, _, _)
        | ExprKind::Fn(_)
        | ExprKind::Case(_, _)
        | ExprKind::From(_)
        | ExprKind::Exists(_)
        | ExprKind::Forall(_, _)
        | ExprKind::Annotated(_, _) => 0,
        ExprKind::Aggregate(_, _) => 7,
        ExprKind::Negate(_) | ExprKind::Apply(_, _) => 8,
        ExprKind::Field(_, _) => 9,
        _ => 10,
    }
}

fn write_paren(out: &mut String, e: &Expr, min_level: u8) {
    if expr_level(e) < min_level {
        out.push('(');
        write_expr(out, e);
        out.push(')');
    } else {
        write_expr(out, e);
    }
}

fn write_literal(out: &mut String, lit: &Literal) {
    match lit {
        Literal::Unit => out.push_str("()"),
        Literal::Bool(b) => {
            let _ = write!(out, "{}", b);
        }
        Literal::Int(n) if *n < 0 => {
            let _ = write!(out, "~{}", -n);
        }
        Literal::Int(n) => {
            let _ = write!(out, "{}", n);
        }
        Literal::Real(r) if *r < 0.0 => {
            let _ = write!(out, "~{}", fmt_real(-r));
        }
        Literal::Real(r) => {
            let _ = write!(out, "{}", fmt_real(*r));
        }
        Literal::Char(c) => {
            let _ = write!(out, "#\"{}\"", escape_char(*c));
        }
        Literal::Str(s) => {
            out.push('"');
            for c in s.chars() {
                out.push_str(&escape_char(c));
            }
            out.push('"');
        }
    }
}

/// Reals always print a decimal point so they re-lex as reals
fn fmt_real(r: f64) -> String {
    let text = r.to_string();
    if text.contains('.') || text.contains('e') || text.contains("inf") || text.contains("NaN") {
        text
    } else {
        format!("{}.0", text)
    }
}

fn escape_char(c: char) -> String {
    match c {
        '\n' => "\\n".to_string(),
        '\t' => "\\t".to_string(),
        '\r' => "\\r".to_string(),
        '\\' => "\\\\".to_string(),
        '"' => "\\\"".to_string(),
        other => other.to_string(),
    }
}

fn write_expr(out: &mut String, e: &Expr) {
    match &e.kind {
        ExprKind::Lit(lit) => write_literal(out, lit),
        ExprKind::Id(name) => {
            let _ = write!(out, "{}", name);
        }
        ExprKind::RecordSel(label) => {
            let _ = write!(out, "#{}", label);
        }
        ExprKind::If(c, t, f) => {
            out.push_str("if ");
            write_expr(out, c);
            out.push_str(" then ");
            write_expr(out, t);
            out.push_str(" else ");
            write_expr(out, f);
        }
        ExprKind::Let(decls, body) => {
            out.push_str("let ");
            for d in decls {
                write_decl(out, d);
                out.push(' ');
            }
            out.push_str("in ");
            write_expr(out, body);
            out.push_str(" end");
        }
        ExprKind::Fn(arms) => {
            out.push_str("fn ");
            write_arms(out, arms);
        }
        ExprKind::Apply(f, arg) => {
            write_paren(out, f, 8);
            out.push(' ');
            write_paren(out, arg, 9);
        }
        ExprKind::Case(scrutinee, arms) => {
            out.push_str("case ");
            write_expr(out, scrutinee);
            out.push_str(" of ");
            write_arms(out, arms);
        }
        ExprKind::Tuple(exps) => {
            out.push('(');
            write_sep(out, exps, ", ", |out, e| write_expr(out, e));
            out.push(')');
        }
        ExprKind::Record { fields, base } => {
            out.push('{');
            if let Some(base) = base {
                write_expr(out, base);
                out.push_str(" with ");
            }
            write_sep(out, fields, ", ", |out, (label, value)| {
                let _ = write!(out, "{} = ", label);
                write_expr(out, value);
            });
            out.push('}');
        }
        ExprKind::List(exps) => {
            out.push('[');
            write_sep(out, exps, ", ", |out, e| write_expr(out, e));
            out.push(']');
        }
        ExprKind::Infix(op, lhs, rhs) => {
            let level = op_level(*op);
            // Right-assoc level 5 mirrors the parser's shape.
            let (lhs_min, rhs_min) = if level == 5 {
                (level + 1, level)
            } else {
                (level, level + 1)
            };
            write_paren(out, lhs, lhs_min);
            let _ = write!(out, " {} ", op.text());
            write_paren(out, rhs, rhs_min);
        }
        ExprKind::Negate(operand) => {
            out.push('~');
            write_paren(out, operand, 8);
        }
        ExprKind::Field(base, label) => {
            write_paren(out, base, 9);
            let _ = write!(out, ".{}", label);
        }
        ExprKind::Annotated(inner, ty) => {
            write_paren(out, inner, 1);
            out.push_str(" : ");
            write_type(out, ty, 0);
        }
        ExprKind::From(steps) => {
            out.push_str("from");
            write_steps(out, steps);
        }
        ExprKind::Exists(steps) => {
            out.push_str("exists");
            write_steps(out, steps);
        }
        ExprKind::Forall(steps, cond) => {
            out.push_str("forall");
            write_steps(out, steps);
            out.push_str(" require ");
            write_expr(out, cond);
        }
        ExprKind::Aggregate(agg, arg) => {
            write_paren(out, agg, 8);
            out.push_str(" over ");
            write_paren(out, arg, 8);
        }
    }
}

/// True when an unparenthesized rendering of `e` would capture a
/// following `|` into its own arms (the dangling-bar ambiguity)
fn swallows_bar(e: &Expr) -> bool {
    match &e.kind {
        ExprKind::Fn(_) | ExprKind::Case(_, _) => true,
        ExprKind::If(_, _, else_exp) => swallows_bar(else_exp),
        ExprKind::Forall(_, cond) => swallows_bar(cond),
        ExprKind::From(_) | ExprKind::Exists(_) => true,
        _ => false,
    }
}

fn write_arms(out: &mut String, arms: &[MatchArm]) {
    let last = arms.len().saturating_sub(1);
    write_sep(out, arms.iter().enumerate(), " | ", |out, (i, arm)| {
        write_pat(out, &arm.pat, false);
        out.push_str(" => ");
        if i != last && swallows_bar(&arm.exp) {
            out.push('(');
            write_expr(out, &arm.exp);
            out.push(')');
        } else {
            write_expr(out, &arm.exp);
        }
    });
}

fn write_steps(out: &mut String, steps: &[Step]) {
    let mut first_scan = true;
    for step in steps {
        match &step.kind {
            StepKind::Scan { pat: p, source, on } => {
                out.push_str(if first_scan { " " } else { ", " });
                first_scan = false;
                write_scan(out, p, source, on);
            }
            StepKind::Join { pat: p, source, on } => {
                out.push_str(" join ");
                write_scan(out, p, source, on);
            }
            StepKind::Where(cond) => {
                out.push_str(" where ");
                write_expr(out, cond);
            }
            StepKind::Group { key, compute } => {
                out.push_str(" group ");
                write_expr(out, key);
                if let Some(c) = compute {
                    out.push_str(" compute ");
                    write_expr(out, c);
                }
            }
            StepKind::Order(key) => {
                out.push_str(" order ");
                write_expr(out, key);
            }
            StepKind::Take(n) => {
                out.push_str(" take ");
                write_expr(out, n);
            }
            StepKind::Skip(n) => {
                out.push_str(" skip ");
                write_expr(out, n);
            }
            StepKind::Yield(e) => {
                out.push_str(" yield ");
                write_expr(out, e);
            }
            StepKind::Into(e) => {
                out.push_str(" into ");
                write_expr(out, e);
            }
            StepKind::Through { pat: p, exp } => {
                out.push_str(" through ");
                write_pat(out, p, false);
                out.push_str(" in ");
                write_expr(out, exp);
            }
            StepKind::Union { distinct, sources } => {
                out.push_str(" union ");
                if *distinct {
                    out.push_str("distinct ");
                }
                write_sep(out, sources, ", ", |out, e| write_expr(out, e));
            }
            StepKind::Intersect { distinct, sources } => {
                out.push_str(" intersect ");
                if *distinct {
                    out.push_str("distinct ");
                }
                write_sep(out, sources, ", ", |out, e| write_expr(out, e));
            }
            StepKind::Except { distinct, sources } => {
                out.push_str(" except ");
                if *distinct {
                    out.push_str("distinct ");
                }
                write_sep(out, sources, ", ", |out, e| write_expr(out, e));
            }
            StepKind::Distinct => out.push_str(" distinct"),
            StepKind::Unorder => out.push_str(" unorder"),
            StepKind::Compute(e) => {
                out.push_str(" compute ");
                write_expr(out, e);
            }
            StepKind::Require(e) => {
                out.push_str(" require ");
                write_expr(out, e);
            }
        }
    }
}

fn write_scan(out: &mut String, p: &Pat, source: &ScanSource, on: &Option<Expr>) {
    write_pat(out, p, false);
    match source {
        ScanSource::In(e) => {
            out.push_str(" in ");
            write_expr(out, e);
        }
        ScanSource::Eq(e) => {
            out.push_str(" = ");
            write_expr(out, e);
        }
    }
    if let Some(cond) = on {
        out.push_str(" on ");
        write_expr(out, cond);
    }
}

fn write_pat(out: &mut String, p: &Pat, atomic: bool) {
    match &p.kind {
        PatKind::Wild => out.push('_'),
        PatKind::Id(name) => {
            let _ = write!(out, "{}", name);
        }
        PatKind::Lit(lit) => write_literal(out, lit),
        PatKind::Cons(head, tail) => {
            if atomic {
                out.push('(');
            }
            write_pat(out, head, true);
            out.push_str(" :: ");
            write_pat(out, tail, false);
            if atomic {
                out.push(')');
            }
        }
        PatKind::Tuple(pats) => {
            out.push('(');
            write_sep(out, pats, ", ", |out, p| write_pat(out, p, false));
            out.push(')');
        }
        PatKind::List(pats) => {
            out.push('[');
            write_sep(out, pats, ", ", |out, p| write_pat(out, p, false));
            out.push(']');
        }
        PatKind::Record { fields, ellipsis } => {
            out.push('{');
            write_sep(out, fields, ", ", |out, (label, p)| {
                let _ = write!(out, "{} = ", label);
                write_pat(out, p, false);
            });
            if *ellipsis {
                if !fields.is_empty() {
                    out.push_str(", ");
                }
                out.push_str("...");
            }
            out.push('}');
        }
        PatKind::Con(name, arg) => match arg {
            Some(arg) => {
                if atomic {
                    out.push('(');
                }
                let _ = write!(out, "{} ", name);
                write_pat(out, arg, true);
                if atomic {
                    out.push(')');
                }
            }
            None => {
                let _ = write!(out, "{}", name);
            }
        },
        PatKind::As(name, inner) => {
            if atomic {
                out.push('(');
            }
            let _ = write!(out, "{} as ", name);
            write_pat(out, inner, false);
            if atomic {
                out.push(')');
            }
        }
        PatKind::Annotated(inner, ty) => {
            out.push('(');
            write_pat(out, inner, false);
            out.push_str(" : ");
            write_type(out, ty, 0);
            out.push(')');
        }
    }
}

fn write_decl(out: &mut String, d: &Decl) {
    match &d.kind {
        DeclKind::Val { rec, inst, binds } => {
            out.push_str("val ");
            if *rec {
                out.push_str("rec ");
            }
            if *inst {
                out.push_str("inst ");
            }
            write_sep(out, binds, " and ", |out, bind| {
                write_pat(out, &bind.pat, false);
                out.push_str(" = ");
                write_expr(out, &bind.exp);
            });
        }
        DeclKind::Fun(binds) => {
            out.push_str("fun ");
            write_sep(out, binds, " and ", |out, bind| {
                let last = bind.clauses.len().saturating_sub(1);
                write_sep(out, bind.clauses.iter().enumerate(), " | ", |out, (i, clause)| {
                    let _ = write!(out, "{}", bind.name);
                    for p in &clause.pats {
                        out.push(' ');
                        write_pat(out, p, true);
                    }
                    if let Some(ty) = &clause.ret_ty {
                        out.push_str(" : ");
                        write_type(out, ty, 0);
                    }
                    out.push_str(" = ");
                    if i != last && swallows_bar(&clause.exp) {
                        out.push('(');
                        write_expr(out, &clause.exp);
                        out.push(')');
                    } else {
                        write_expr(out, &clause.exp);
                    }
                });
            });
        }
        DeclKind::Datatype(binds) => {
            out.push_str("datatype ");
            write_sep(out, binds, " and ", |out, bind| {
                write_tyvars(out, &bind.tyvars);
                let _ = write!(out, "{} = ", bind.name);
                write_sep(out, &bind.ctors, " | ", |out, ctor| {
                    let _ = write!(out, "{}", ctor.name);
                    if let Some(payload) = &ctor.payload {
                        out.push_str(" of ");
                        write_type(out, payload, 1);
                    }
                });
            });
        }
        DeclKind::TypeAlias(binds) => {
            out.push_str("type ");
            write_sep(out, binds, " and ", |out, bind| {
                write_tyvars(out, &bind.tyvars);
                let _ = write!(out, "{} = ", bind.name);
                write_type(out, &bind.ty, 0);
            });
        }
        DeclKind::Over(name) => {
            let _ = write!(out, "over {}", name);
        }
    }
}

fn write_tyvars(out: &mut String, tyvars: &[quill_util::Symbol]) {
    match tyvars {
        [] => {}
        [v] => {
            let _ = write!(out, "'{} ", v);
        }
        many => {
            out.push('(');
            write_sep(out, many, ", ", |out, v| {
                let _ = write!(out, "'{}", v);
            });
            out.push_str(") ");
        }
    }
}

/// Type levels: 0 = any, 1 = tuple operand (no bare `->`),
/// 2 = postfix operand (atoms only)
fn write_type(out: &mut String, t: &TypeExp, min_level: u8) {
    match &t.kind {
        TypeExpKind::Var(name) => {
            let _ = write!(out, "'{}", name);
        }
        TypeExpKind::Named(args, name) => {
            match args.len() {
                0 => {}
                1 => {
                    write_type(out, &args[0], 2);
                    out.push(' ');
                }
                _ => {
                    out.push('(');
                    write_sep(out, args, ", ", |out, a| write_type(out, a, 0));
                    out.push_str(") ");
                }
            }
            let _ = write!(out, "{}", name);
        }
        TypeExpKind::Record(fields) => {
            out.push('{');
            write_sep(out, fields, ", ", |out, (label, ty)| {
                let _ = write!(out, "{}: ", label);
                write_type(out, ty, 0);
            });
            out.push('}');
        }
        TypeExpKind::Tuple(parts) => {
            if min_level >= 2 {
                out.push('(');
            }
            write_sep(out, parts, " * ", |out, p| write_type(out, p, 2));
            if min_level >= 2 {
                out.push(')');
            }
        }
        TypeExpKind::Fn(param, result) => {
            if min_level >= 1 {
                out.push('(');
            }
            write_type(out, param, 1);
            out.push_str(" -> ");
            write_type(out, result, 0);
            if min_level >= 1 {
                out.push(')');
            }
        }
        TypeExpKind::Composite(parts) => {
            out.push('(');
            write_sep(out, parts, ", ", |out, p| write_type(out, p, 0));
            out.push(')');
        }
        TypeExpKind::Expression(exp) => {
            out.push_str("typeof ");
            write_expr(out, exp);
        }
    }
}

fn write_sep<T>(
    out: &mut String,
    items: impl IntoIterator<Item = T>,
    sep: &str,
    mut f: impl FnMut(&mut String, T),
) {
    let mut first = true;
    for item in items {
        if !first {
            out.push_str(sep);
        }
        first = false;
        f(out, item);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Parser;
    use quill_util::FileId;

    /// Unparse-then-reparse must reproduce the same tree.
    fn round_trip(source: &str) {
        let stmt1 = Parser::parse_single(source, FileId::STDIN).unwrap();
        let printed = statement(&stmt1);
        let stmt2 = Parser::parse_single(&format!("{};", printed), FileId::STDIN)
            .unwrap_or_else(|e| panic!("reparse of {:?} failed: {}", printed, e));
        assert_eq!(stmt1, stmt2, "round trip changed tree for {:?}", printed);
    }

    #[test]
    fn test_round_trip_arithmetic() {
        round_trip("1 + 2 * 3;");
        round_trip("(1 + 2) * 3;");
        round_trip("1 - 2 - 3;");
        round_trip("~x + ~2;");
    }

    #[test]
    fn test_round_trip_cons() {
        round_trip("1 :: 2 :: nil;");
        round_trip("(1 :: nil) @ [2];");
    }

    #[test]
    fn test_round_trip_application() {
        round_trip("f x y;");
        round_trip("f (g x);");
        round_trip("#deptno e;");
        round_trip("e.deptno;");
    }

    #[test]
    fn test_round_trip_closed_forms() {
        round_trip("if a then 1 else 2;");
        round_trip("fn x => x + 1;");
        round_trip("case xs of x :: _ => x | [] => 0;");
        round_trip("let val x = 1 in x end;");
    }

    #[test]
    fn test_round_trip_records() {
        round_trip("{id = 1, name = \"a\"};");
        round_trip("{e with sal = 100};");
        round_trip("(1, \"a\", true);");
    }

    #[test]
    fn test_round_trip_decls() {
        round_trip("val x = 1;");
        round_trip("val rec f = fn x => f x;");
        round_trip("fun fact n = if n < 1 then 1 else n * fact (n - 1);");
        round_trip("fun f 0 = 1 | f n = n * f (n - 1);");
        round_trip("datatype 'a opt = NIL | CONS of 'a * 'a opt;");
        round_trip("type point = {x: int, y: int};");
        round_trip("over describe;");
    }

    #[test]
    fn test_round_trip_query() {
        round_trip("from e in emps where e.deptno = 10 yield e.id;");
        round_trip("from e in emps, d in depts where e.deptno = d.deptno yield e.name;");
        round_trip("from e in emps group e.deptno compute sum over e.sal;");
        round_trip("from e in emps order e.sal take 3;");
        round_trip("exists e in emps where e.sal > 100;");
        round_trip("forall e in emps require e.sal > 0;");
    }

    #[test]
    fn test_round_trip_types() {
        round_trip("x : int list;");
        round_trip("x : int * string -> bool;");
        round_trip("x : (int -> int) list;");
        round_trip("x : {id: int, name: string};");
    }

    #[test]
    fn test_negative_literals_print_with_tilde() {
        let stmt = Parser::parse_single("~5;", FileId::STDIN).unwrap();
        assert_eq!(statement(&stmt), "~5");
    }

    #[test]
    fn test_string_escapes_survive() {
        round_trip("\"a\\nb\\\"c\";");
    }

    #[test]
    fn test_real_literals_keep_point() {
        let stmt = Parser::parse_single("1.0;", FileId::STDIN).unwrap();
        assert_eq!(statement(&stmt), "1.0");
    }
}
