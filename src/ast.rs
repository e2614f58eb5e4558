// ast.rs - Syntax tree consumed by the compiler.
//
// The textual front end lives outside this crate; it hands over these types.
// The constructor helpers at the bottom keep hand-built trees readable in
// tests and embedding code.

/// One top-level statement of a vore program.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Find(FindCommand),
    Replace(ReplaceCommand),
    Set(SetCommand),
}

/// Which matches of a search are reported.
///
/// With `all` unset the search stops after `skip + take` matches. `last`,
/// when non-zero, keeps only that many of the most recent matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchWindow {
    pub all: bool,
    pub skip: usize,
    pub take: usize,
    pub last: usize,
}

impl MatchWindow {
    pub fn all() -> Self {
        MatchWindow {
            all: true,
            skip: 0,
            take: 0,
            last: 0,
        }
    }

    pub fn skip_take(skip: usize, take: usize) -> Self {
        MatchWindow {
            all: false,
            skip,
            take,
            last: 0,
        }
    }

    pub fn last(last: usize) -> Self {
        MatchWindow {
            all: true,
            skip: 0,
            take: 0,
            last,
        }
    }
}

impl Default for MatchWindow {
    fn default() -> Self {
        MatchWindow::all()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FindCommand {
    pub window: MatchWindow,
    pub body: Vec<Expression>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReplaceCommand {
    pub window: MatchWindow,
    pub body: Vec<Expression>,
    pub result: Vec<Atom>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SetCommand {
    pub id: String,
    pub body: SetBody,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SetBody {
    /// `set X to pattern ... [begin predicate end]`
    Pattern {
        body: Vec<Expression>,
        predicate: Vec<Statement>,
    },
    /// `set X to matches (command)`
    Matches(Box<Command>),
    /// `set X to transform ... end`
    Transform(Vec<Statement>),
}

/// Pieces of a replacement: literal text or a variable's value.
#[derive(Debug, Clone, PartialEq)]
pub enum Atom {
    String(String),
    Variable(String),
}

// ============================================================================
// Search expressions
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    /// Bounded or unbounded repetition of `body`.
    Loop(LoopExpr),
    /// `left or right`; chains nest to the right.
    Branch {
        left: Literal,
        right: Box<Expression>,
    },
    /// `body = name` capture.
    Dec { name: String, body: Literal },
    /// `{ ... } = name` inline subroutine, callable by name inside its body.
    Sub { name: String, body: Vec<Expression> },
    /// `in a, b, c` / `not in a, b, c`
    List { not: bool, contents: Vec<Listable> },
    Primary(Literal),
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoopExpr {
    pub min: usize,
    /// `None` means unbounded.
    pub max: Option<usize>,
    pub fewest: bool,
    /// Named loops keep one capture scope per iteration.
    pub name: Option<String>,
    pub body: Box<Literal>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    String {
        value: String,
        not: bool,
        caseless: bool,
    },
    Range {
        from: String,
        to: String,
        not: bool,
    },
    CharClass {
        class: CharClass,
        not: bool,
    },
    Variable(String),
    SubExpr(Vec<Expression>),
}

/// A member of an `in` / `not in` list.
#[derive(Debug, Clone, PartialEq)]
pub enum Listable {
    String { value: String, caseless: bool },
    Range { from: String, to: String },
    CharClass(CharClass),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CharClass {
    Any,
    Whitespace,
    Digit,
    Upper,
    Lower,
    Letter,
    FileStart,
    FileEnd,
    LineStart,
    LineEnd,
    WordStart,
    WordEnd,
    WholeFile,
    WholeLine,
    WholeWord,
}

// ============================================================================
// Script statements (predicates and transforms)
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Set { name: String, expr: ProcExpr },
    Return(ProcExpr),
    If {
        condition: ProcExpr,
        then_body: Vec<Statement>,
        else_body: Vec<Statement>,
    },
    Loop(Vec<Statement>),
    Break,
    Continue,
    Debug(ProcExpr),
    Expr(ProcExpr),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProcExpr {
    String(String),
    Number(i64),
    Boolean(bool),
    Variable(String),
    Unary {
        op: UnaryOp,
        operand: Box<ProcExpr>,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<ProcExpr>,
        rhs: Box<ProcExpr>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Head,
    Tail,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    Equal,
    NotEqual,
    And,
    Or,
}

impl BinaryOp {
    pub fn is_arithmetic(self) -> bool {
        matches!(
            self,
            BinaryOp::Add
                | BinaryOp::Subtract
                | BinaryOp::Multiply
                | BinaryOp::Divide
                | BinaryOp::Modulo
        )
    }

    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOp::Less
                | BinaryOp::LessEqual
                | BinaryOp::Greater
                | BinaryOp::GreaterEqual
                | BinaryOp::Equal
                | BinaryOp::NotEqual
        )
    }

    pub fn is_logical(self) -> bool {
        matches!(self, BinaryOp::And | BinaryOp::Or)
    }
}

// ============================================================================
// Constructors
// ============================================================================

impl Literal {
    pub fn string(value: &str) -> Self {
        Literal::String {
            value: value.to_string(),
            not: false,
            caseless: false,
        }
    }

    pub fn caseless(value: &str) -> Self {
        Literal::String {
            value: value.to_string(),
            not: false,
            caseless: true,
        }
    }

    pub fn class(class: CharClass) -> Self {
        Literal::CharClass { class, not: false }
    }

    pub fn not_class(class: CharClass) -> Self {
        Literal::CharClass { class, not: true }
    }

    pub fn range(from: &str, to: &str) -> Self {
        Literal::Range {
            from: from.to_string(),
            to: to.to_string(),
            not: false,
        }
    }

    pub fn var(name: &str) -> Self {
        Literal::Variable(name.to_string())
    }

    pub fn group(body: Vec<Expression>) -> Self {
        Literal::SubExpr(body)
    }
}

impl From<Literal> for Expression {
    fn from(literal: Literal) -> Self {
        Expression::Primary(literal)
    }
}

impl Expression {
    pub fn repeat(min: usize, max: Option<usize>, body: Literal) -> Self {
        Expression::Loop(LoopExpr {
            min,
            max,
            fewest: false,
            name: None,
            body: Box::new(body),
        })
    }

    pub fn at_least(min: usize, body: Literal) -> Self {
        Expression::repeat(min, None, body)
    }

    pub fn at_most(max: usize, body: Literal) -> Self {
        Expression::repeat(0, Some(max), body)
    }

    pub fn between(min: usize, max: usize, body: Literal) -> Self {
        Expression::repeat(min, Some(max), body)
    }

    pub fn exactly(n: usize, body: Literal) -> Self {
        Expression::repeat(n, Some(n), body)
    }

    pub fn maybe(body: Literal) -> Self {
        Expression::repeat(0, Some(1), body)
    }

    /// Switch a loop to lazy repetition; other expressions are returned as is.
    pub fn fewest(self) -> Self {
        match self {
            Expression::Loop(mut l) => {
                l.fewest = true;
                Expression::Loop(l)
            }
            other => other,
        }
    }

    /// Give a loop its own per-iteration capture scope.
    pub fn named(self, name: &str) -> Self {
        match self {
            Expression::Loop(mut l) => {
                l.name = Some(name.to_string());
                Expression::Loop(l)
            }
            other => other,
        }
    }

    pub fn or(left: Literal, right: impl Into<Expression>) -> Self {
        Expression::Branch {
            left,
            right: Box::new(right.into()),
        }
    }

    pub fn capture(name: &str, body: Literal) -> Self {
        Expression::Dec {
            name: name.to_string(),
            body,
        }
    }

    pub fn subroutine(name: &str, body: Vec<Expression>) -> Self {
        Expression::Sub {
            name: name.to_string(),
            body,
        }
    }

    pub fn in_list(contents: Vec<Listable>) -> Self {
        Expression::List {
            not: false,
            contents,
        }
    }

    pub fn not_in_list(contents: Vec<Listable>) -> Self {
        Expression::List {
            not: true,
            contents,
        }
    }
}

impl Listable {
    pub fn string(value: &str) -> Self {
        Listable::String {
            value: value.to_string(),
            caseless: false,
        }
    }

    pub fn range(from: &str, to: &str) -> Self {
        Listable::Range {
            from: from.to_string(),
            to: to.to_string(),
        }
    }
}

impl Command {
    pub fn find(window: MatchWindow, body: Vec<Expression>) -> Self {
        Command::Find(FindCommand { window, body })
    }

    pub fn find_all(body: Vec<Expression>) -> Self {
        Command::find(MatchWindow::all(), body)
    }

    pub fn replace(window: MatchWindow, body: Vec<Expression>, result: Vec<Atom>) -> Self {
        Command::Replace(ReplaceCommand {
            window,
            body,
            result,
        })
    }

    pub fn set_pattern(id: &str, body: Vec<Expression>, predicate: Vec<Statement>) -> Self {
        Command::Set(SetCommand {
            id: id.to_string(),
            body: SetBody::Pattern { body, predicate },
        })
    }

    pub fn set_transform(id: &str, statements: Vec<Statement>) -> Self {
        Command::Set(SetCommand {
            id: id.to_string(),
            body: SetBody::Transform(statements),
        })
    }
}

impl ProcExpr {
    pub fn string(value: &str) -> Self {
        ProcExpr::String(value.to_string())
    }

    pub fn var(name: &str) -> Self {
        ProcExpr::Variable(name.to_string())
    }

    pub fn unary(op: UnaryOp, operand: ProcExpr) -> Self {
        ProcExpr::Unary {
            op,
            operand: Box::new(operand),
        }
    }

    pub fn binary(op: BinaryOp, lhs: ProcExpr, rhs: ProcExpr) -> Self {
        ProcExpr::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loop_modifiers_only_touch_loops() {
        let e = Expression::at_least(1, Literal::class(CharClass::Digit))
            .fewest()
            .named("digits");
        match e {
            Expression::Loop(l) => {
                assert!(l.fewest);
                assert_eq!(l.name.as_deref(), Some("digits"));
                assert_eq!(l.min, 1);
                assert_eq!(l.max, None);
            }
            other => panic!("expected loop, got {:?}", other),
        }
        let lit: Expression = Literal::string("x").into();
        assert_eq!(lit.clone().fewest(), lit);
    }

    #[test]
    fn operator_groups() {
        assert!(BinaryOp::Modulo.is_arithmetic());
        assert!(BinaryOp::NotEqual.is_comparison());
        assert!(BinaryOp::Or.is_logical());
        assert!(!BinaryOp::Add.is_comparison());
    }
}
