//! AST printers.
//!
//! Both printers are read-only [`Visitor`]s over a parsed tree:
//!
//! | Printer         | Output                                             |
//! |-----------------|----------------------------------------------------|
//! | [`LispPrinter`] | `(template (* 6 (group (+ 4 2))))`                 |
//! | [`JsonPrinter`] | indented JSON, one object per node, `"type"` first |

use serde_json::{json, Value as Json};

use crate::template::ast::{BinOp, Expr, UnaryOp, Visitor};
use crate::template::token::Token;
use crate::template::Value;

// ── Lisp ──────────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct LispPrinter;

impl LispPrinter {
    pub fn print(expr: &Expr) -> String {
        expr.accept(&mut LispPrinter)
    }

    fn parenthesize<'e>(
        &mut self,
        name: &str,
        exprs: impl IntoIterator<Item = &'e Expr>,
    ) -> String {
        let mut out = format!("({name}");
        for e in exprs {
            out.push(' ');
            out.push_str(&e.accept(self));
        }
        out.push(')');
        out
    }
}

impl Visitor for LispPrinter {
    type Output = String;

    fn visit_text(&mut self, raw: &str) -> String {
        format!("{raw:?}")
    }

    fn visit_number(&mut self, value: f64, _raw: &str) -> String {
        Value::Float(value).to_string()
    }

    fn visit_string(&mut self, value: &str, _raw: &str) -> String {
        format!("{value:?}")
    }

    fn visit_bool(&mut self, value: bool) -> String {
        value.to_string()
    }

    fn visit_nil(&mut self) -> String {
        "nil".to_owned()
    }

    fn visit_grouping(&mut self, inner: &Expr) -> String {
        self.parenthesize("group", [inner])
    }

    fn visit_unary(&mut self, op: UnaryOp, operand: &Expr) -> String {
        self.parenthesize(op.symbol(), [operand])
    }

    fn visit_binary(&mut self, left: &Expr, op: BinOp, right: &Expr) -> String {
        self.parenthesize(op.symbol(), [left, right])
    }

    fn visit_ternary(&mut self, cond: &Expr, then: &Expr, otherwise: &Expr) -> String {
        self.parenthesize("ternary", [cond, then, otherwise])
    }

    fn visit_template(&mut self, parts: &[Expr]) -> String {
        self.parenthesize("template", parts)
    }

    fn visit_variable(&mut self, name: &Token) -> String {
        format!("(var {})", name.lexeme)
    }

    fn visit_get(&mut self, object: &Expr, name: &Token, optional: bool) -> String {
        let tag = if optional { "?get" } else { "get" };
        format!("({tag} {} {})", object.accept(self), name.lexeme)
    }

    fn visit_index(&mut self, object: &Expr, index: &Expr, optional: bool) -> String {
        let tag = if optional { "?index" } else { "index" };
        self.parenthesize(tag, [object, index])
    }

    fn visit_call(&mut self, callee: &Expr, args: &[Expr], optional: bool) -> String {
        let tag = if optional { "?call" } else { "call" };
        self.parenthesize(tag, std::iter::once(callee).chain(args))
    }

    fn visit_array(&mut self, items: &[Expr]) -> String {
        self.parenthesize("array", items)
    }

    fn visit_map(&mut self, entries: &[(Expr, Expr)]) -> String {
        let mut out = "(map".to_owned();
        for (k, v) in entries {
            out.push(' ');
            out.push_str(&self.parenthesize("entry", [k, v]));
        }
        out.push(')');
        out
    }

    fn visit_parse_error(&mut self, message: &str, token: &Token) -> String {
        format!("(error {} {message:?})", token.position)
    }
}

// ── JSON ──────────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct JsonPrinter;

impl JsonPrinter {
    pub fn to_json(expr: &Expr) -> Json {
        expr.accept(&mut JsonPrinter)
    }

    /// Two-space indented JSON.
    pub fn print(expr: &Expr) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&Self::to_json(expr))
    }

    fn all(&mut self, exprs: &[Expr]) -> Vec<Json> {
        exprs.iter().map(|e| e.accept(self)).collect()
    }
}

fn literal(value: Json, raw: &str) -> Json {
    json!({ "type": "Literal", "value": value, "raw": raw })
}

impl Visitor for JsonPrinter {
    type Output = Json;

    fn visit_text(&mut self, raw: &str) -> Json {
        literal(json!(raw), raw)
    }

    fn visit_number(&mut self, value: f64, raw: &str) -> Json {
        literal(json!(value), raw)
    }

    fn visit_string(&mut self, value: &str, raw: &str) -> Json {
        literal(json!(value), raw)
    }

    fn visit_bool(&mut self, value: bool) -> Json {
        literal(json!(value), &value.to_string())
    }

    fn visit_nil(&mut self) -> Json {
        literal(Json::Null, "nil")
    }

    fn visit_grouping(&mut self, inner: &Expr) -> Json {
        json!({ "type": "Grouping", "expression": inner.accept(self) })
    }

    fn visit_unary(&mut self, op: UnaryOp, operand: &Expr) -> Json {
        json!({ "type": "Unary", "operator": op.symbol(), "right": operand.accept(self) })
    }

    fn visit_binary(&mut self, left: &Expr, op: BinOp, right: &Expr) -> Json {
        let left = left.accept(self);
        let right = right.accept(self);
        json!({ "type": "Binary", "left": left, "operator": op.symbol(), "right": right })
    }

    fn visit_ternary(&mut self, cond: &Expr, then: &Expr, otherwise: &Expr) -> Json {
        let cond = cond.accept(self);
        let then = then.accept(self);
        let otherwise = otherwise.accept(self);
        json!({ "type": "Ternary", "cond": cond, "then": then, "else": otherwise })
    }

    fn visit_template(&mut self, parts: &[Expr]) -> Json {
        json!({ "type": "Template", "exprs": self.all(parts) })
    }

    fn visit_variable(&mut self, name: &Token) -> Json {
        json!({ "type": "Variable", "name": name.lexeme })
    }

    fn visit_get(&mut self, object: &Expr, name: &Token, optional: bool) -> Json {
        json!({
            "type": "Get",
            "object": object.accept(self),
            "identifier": name.lexeme,
            "optional": optional,
        })
    }

    fn visit_index(&mut self, object: &Expr, index: &Expr, optional: bool) -> Json {
        let object = object.accept(self);
        let index = index.accept(self);
        json!({ "type": "Index", "object": object, "index": index, "optional": optional })
    }

    fn visit_call(&mut self, callee: &Expr, args: &[Expr], optional: bool) -> Json {
        let callee = callee.accept(self);
        json!({
            "type": "Call",
            "callee": callee,
            "arguments": self.all(args),
            "optional": optional,
        })
    }

    fn visit_array(&mut self, items: &[Expr]) -> Json {
        json!({ "type": "Array", "values": self.all(items) })
    }

    fn visit_map(&mut self, entries: &[(Expr, Expr)]) -> Json {
        let entries: Vec<Json> = entries
            .iter()
            .map(|(k, v)| json!({ "key": k.accept(self), "value": v.accept(self) }))
            .collect();
        json!({ "type": "Map", "entries": entries })
    }

    fn visit_parse_error(&mut self, message: &str, token: &Token) -> Json {
        json!({
            "type": "ParseError",
            "message": format!("Error at position {}. {message}", token.position),
        })
    }
}
