/// Parsed XPath 2.0 expression.
///
/// The tree is deliberately loose: it keeps the structure needed to walk
/// sub-expressions and inspect function calls, not a typed evaluation model.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    StringLiteral(String),
    NumberLiteral(String),
    VarRef(String),
    ContextItem,
    FunctionCall {
        name: String,
        args: Vec<Expr>,
    },
    /// Path expression; `root` is `/` or `//` for absolute paths.
    Path {
        root: Option<PathRoot>,
        steps: Vec<Step>,
    },
    Filter {
        primary: Box<Expr>,
        predicates: Vec<Expr>,
    },
    Binary {
        op: String,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Unary {
        op: char,
        operand: Box<Expr>,
    },
    Sequence(Vec<Expr>),
    If {
        condition: Box<Expr>,
        then_branch: Box<Expr>,
        else_branch: Box<Expr>,
    },
    /// `for`, `some` and `every` expressions.
    Binding {
        keyword: String,
        bindings: Vec<(String, Expr)>,
        body: Box<Expr>,
    },
    /// `instance of`, `treat as`, `castable as` and `cast as`.
    TypeOp {
        op: String,
        operand: Box<Expr>,
        type_name: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathRoot {
    Root,
    Descendant,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    Axis {
        axis: String,
        test: NodeTest,
        predicates: Vec<Expr>,
    },
    /// `//` between two steps.
    DescendantOrSelf,
    Expr(Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeTest {
    Name(String),
    Wildcard,
    /// Kind test such as `text()` or `element(a)`, kept as written.
    Kind(String),
}

impl Expr {
    /// Direct children, in source order.
    pub fn sub_expressions(&self) -> Vec<&Expr> {
        match self {
            Expr::StringLiteral(_) | Expr::NumberLiteral(_) | Expr::VarRef(_) | Expr::ContextItem => {
                Vec::new()
            }
            Expr::FunctionCall { args, .. } => args.iter().collect(),
            Expr::Path { steps, .. } => steps
                .iter()
                .flat_map(|step| match step {
                    Step::Axis { predicates, .. } => predicates.iter().collect::<Vec<_>>(),
                    Step::DescendantOrSelf => Vec::new(),
                    Step::Expr(expr) => vec![expr],
                })
                .collect(),
            Expr::Filter {
                primary,
                predicates,
            } => std::iter::once(primary.as_ref())
                .chain(predicates.iter())
                .collect(),
            Expr::Binary { left, right, .. } => vec![left.as_ref(), right.as_ref()],
            Expr::Unary { operand, .. } | Expr::TypeOp { operand, .. } => vec![operand.as_ref()],
            Expr::Sequence(items) => items.iter().collect(),
            Expr::If {
                condition,
                then_branch,
                else_branch,
            } => vec![condition.as_ref(), then_branch.as_ref(), else_branch.as_ref()],
            Expr::Binding { bindings, body, .. } => bindings
                .iter()
                .map(|(_, expr)| expr)
                .chain(std::iter::once(body.as_ref()))
                .collect(),
        }
    }

    /// Local name of a function call, with a `fn:` prefix stripped.
    pub fn function_local_name(&self) -> Option<&str> {
        match self {
            Expr::FunctionCall { name, .. } => {
                Some(name.strip_prefix("fn:").unwrap_or(name.as_str()))
            }
            _ => None,
        }
    }
}
