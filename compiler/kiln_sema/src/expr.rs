//! Property body expressions.
//!
//! Bodies are small expression trees interpreted by the evaluator. They are
//! built once, while defining the language, and checked statically by
//! `LanguageBuilder::build`.

use kiln_ir::{DynVarId, KindId, Metadata, PropertyId, SourceLocation};

use crate::Value;

/// Binary operators.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    /// Structural equality on any two values.
    Eq,
    Ne,
    Lt,
    Le,
    /// Short-circuit conjunction.
    And,
    /// Short-circuit disjunction.
    Or,
}

/// One arm of [`Expr::Match`].
#[derive(Clone, Debug)]
pub struct MatchArm {
    /// Kind to match; `None` matches anything, including null.
    pub kind: Option<KindId>,
    /// Local slot receiving the matched value.
    pub slot: usize,
    /// Bind the bare node instead of the full entity.
    pub bare: bool,
    pub body: Expr,
}

/// Expression tree.
#[derive(Clone, Debug)]
pub enum Expr {
    Lit(Value),
    /// The receiver, as an entity.
    SelfEntity,
    /// Parameter by position.
    Arg(usize),
    /// Local slot introduced by `Let`, `Map` or a match arm.
    Local(usize),
    Let {
        slot: usize,
        value: Box<Expr>,
        body: Box<Expr>,
    },

    /// Read a dynamic variable.
    DynVar(DynVarId),
    /// Evaluate `body` with `var` bound to `value`.
    BindDynVar {
        var: DynVarId,
        value: Box<Expr>,
        body: Box<Expr>,
    },

    /// Child by field index. The result shares the parent entity's context.
    Child {
        node: Box<Expr>,
        index: usize,
    },
    /// All children, as an array of entities.
    Children(Box<Expr>),
    Parent(Box<Expr>),
    /// Token text of a node.
    Text(Box<Expr>),
    /// Whether a metadata field is set on an entity.
    MetadataFlag {
        entity: Box<Expr>,
        field: usize,
    },

    /// Property call, dispatched on the runtime kind of `receiver`.
    Call {
        receiver: Box<Expr>,
        prop: PropertyId,
        args: Vec<Expr>,
    },

    /// Environment the node was populated in.
    NodeEnv(Box<Expr>),
    /// Environment the node's children were populated against.
    ChildrenEnv(Box<Expr>),
    /// Look `symbol` up in `env`.
    ///
    /// Produces an array of entities, or the first entity (or null) when
    /// `first` is set. Only bindings whose metadata contains `require` are
    /// returned.
    EnvGet {
        env: Box<Expr>,
        symbol: Box<Expr>,
        first: bool,
        require: Metadata,
    },

    /// Downcast an entity. Null when the kind does not match, unless
    /// `or_raise` is set.
    Cast {
        value: Box<Expr>,
        kind: KindId,
        or_raise: bool,
    },
    /// Dispatch on the runtime kind of an entity. First matching arm wins.
    Match {
        value: Box<Expr>,
        arms: Vec<MatchArm>,
    },
    If {
        cond: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Not(Box<Expr>),
    IsNull(Box<Expr>),
    Raise(String),
    MakeArray(Vec<Expr>),
    /// Evaluate `body` for each element of `array` bound to `slot`.
    Map {
        array: Box<Expr>,
        slot: usize,
        body: Box<Expr>,
    },
    Len(Box<Expr>),

    /// Logic variable field of a node, by index.
    LogicVar {
        node: Box<Expr>,
        index: usize,
    },
    /// `Domain(var, values)`.
    Domain {
        var: Box<Expr>,
        values: Box<Expr>,
        origin: SourceLocation,
    },
    /// `Bind(a, b)`, compared with `eq` when given.
    Bind {
        a: Box<Expr>,
        b: Box<Expr>,
        eq: Option<PropertyId>,
        origin: SourceLocation,
    },
    /// Keep the values of `var` for which `prop` returns true.
    Predicate {
        var: Box<Expr>,
        prop: PropertyId,
        origin: SourceLocation,
    },
    /// Conjunction; operands may also be arrays of equations.
    All(Vec<Expr>),
    /// Disjunction; operands may also be arrays of equations.
    Any(Vec<Expr>),
    /// Solve an equation, binding its variables on success.
    Solve(Box<Expr>),
    /// Value of a solved logic variable.
    LogicValue(Box<Expr>),
}

impl Expr {
    pub fn lit(value: impl Into<Value>) -> Self {
        Expr::Lit(value.into())
    }

    pub fn let_in(slot: usize, value: Expr, body: Expr) -> Self {
        Expr::Let {
            slot,
            value: Box::new(value),
            body: Box::new(body),
        }
    }

    pub fn bind_dynvar(var: DynVarId, value: Expr, body: Expr) -> Self {
        Expr::BindDynVar {
            var,
            value: Box::new(value),
            body: Box::new(body),
        }
    }

    pub fn child(node: Expr, index: usize) -> Self {
        Expr::Child {
            node: Box::new(node),
            index,
        }
    }

    pub fn text(node: Expr) -> Self {
        Expr::Text(Box::new(node))
    }

    pub fn call(receiver: Expr, prop: PropertyId, args: Vec<Expr>) -> Self {
        Expr::Call {
            receiver: Box::new(receiver),
            prop,
            args,
        }
    }

    /// Call on the receiver itself.
    pub fn self_call(prop: PropertyId) -> Self {
        Expr::call(Expr::SelfEntity, prop, Vec::new())
    }

    pub fn node_env(node: Expr) -> Self {
        Expr::NodeEnv(Box::new(node))
    }

    pub fn env_get(env: Expr, symbol: Expr) -> Self {
        Expr::EnvGet {
            env: Box::new(env),
            symbol: Box::new(symbol),
            first: false,
            require: Metadata::EMPTY,
        }
    }

    pub fn env_get_first(env: Expr, symbol: Expr) -> Self {
        Expr::EnvGet {
            env: Box::new(env),
            symbol: Box::new(symbol),
            first: true,
            require: Metadata::EMPTY,
        }
    }

    pub fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Self {
        Expr::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    pub fn if_else(cond: Expr, then: Expr, otherwise: Expr) -> Self {
        Expr::If {
            cond: Box::new(cond),
            then: Box::new(then),
            otherwise: Box::new(otherwise),
        }
    }

    pub fn matching(value: Expr, arms: Vec<MatchArm>) -> Self {
        Expr::Match {
            value: Box::new(value),
            arms,
        }
    }

    pub fn map(array: Expr, slot: usize, body: Expr) -> Self {
        Expr::Map {
            array: Box::new(array),
            slot,
            body: Box::new(body),
        }
    }

    pub fn logic_var(node: Expr, index: usize) -> Self {
        Expr::LogicVar {
            node: Box::new(node),
            index,
        }
    }

    #[track_caller]
    pub fn domain(var: Expr, values: Expr) -> Self {
        Expr::Domain {
            var: Box::new(var),
            values: Box::new(values),
            origin: SourceLocation::caller(),
        }
    }

    #[track_caller]
    pub fn bind(a: Expr, b: Expr, eq: Option<PropertyId>) -> Self {
        Expr::Bind {
            a: Box::new(a),
            b: Box::new(b),
            eq,
            origin: SourceLocation::caller(),
        }
    }

    #[track_caller]
    pub fn predicate(var: Expr, prop: PropertyId) -> Self {
        Expr::Predicate {
            var: Box::new(var),
            prop,
            origin: SourceLocation::caller(),
        }
    }

    pub fn solve(equation: Expr) -> Self {
        Expr::Solve(Box::new(equation))
    }

    pub fn logic_value(var: Expr) -> Self {
        Expr::LogicValue(Box::new(var))
    }

    /// Direct sub-expressions, in evaluation order.
    ///
    /// Binding forms (`Let`, `BindDynVar`, `Map`, `Match`) are included;
    /// callers that track scopes handle those variants themselves.
    pub fn children(&self) -> Vec<&Expr> {
        match self {
            Expr::Lit(_)
            | Expr::SelfEntity
            | Expr::Arg(_)
            | Expr::Local(_)
            | Expr::DynVar(_)
            | Expr::Raise(_) => Vec::new(),
            Expr::Let { value, body, .. } | Expr::BindDynVar { value, body, .. } => {
                vec![&**value, &**body]
            }
            Expr::Child { node, .. } | Expr::LogicVar { node, .. } => vec![&**node],
            Expr::Children(e)
            | Expr::Parent(e)
            | Expr::Text(e)
            | Expr::NodeEnv(e)
            | Expr::ChildrenEnv(e)
            | Expr::Not(e)
            | Expr::IsNull(e)
            | Expr::Len(e)
            | Expr::Solve(e)
            | Expr::LogicValue(e) => vec![&**e],
            Expr::MetadataFlag { entity, .. } => vec![&**entity],
            Expr::Call { receiver, args, .. } => {
                std::iter::once(&**receiver).chain(args.iter()).collect()
            }
            Expr::EnvGet { env, symbol, .. } => vec![&**env, &**symbol],
            Expr::Cast { value, .. } => vec![&**value],
            Expr::Match { value, arms } => std::iter::once(&**value)
                .chain(arms.iter().map(|arm| &arm.body))
                .collect(),
            Expr::If {
                cond,
                then,
                otherwise,
            } => vec![&**cond, &**then, &**otherwise],
            Expr::Binary { lhs, rhs, .. } => vec![&**lhs, &**rhs],
            Expr::MakeArray(items) | Expr::All(items) | Expr::Any(items) => items.iter().collect(),
            Expr::Map { array, body, .. } => vec![&**array, &**body],
            Expr::Domain { var, values, .. } => vec![&**var, &**values],
            Expr::Bind { a, b, .. } => vec![&**a, &**b],
            Expr::Predicate { var, .. } => vec![&**var],
        }
    }

    /// One past the highest local slot used anywhere in this expression.
    pub fn frame_size(&self) -> usize {
        let own = match self {
            Expr::Local(slot) | Expr::Let { slot, .. } | Expr::Map { slot, .. } => slot + 1,
            Expr::Match { arms, .. } => arms.iter().map(|arm| arm.slot + 1).max().unwrap_or(0),
            _ => 0,
        };
        self.children()
            .into_iter()
            .map(Expr::frame_size)
            .fold(own, usize::max)
    }
}
