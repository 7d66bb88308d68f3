//! Runtime values produced by property evaluation.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use kiln_ir::{EnvId, Entity, KindId, LogicVarId, Metadata, Rebindings, Symbol};
use kiln_logic::Equation;

/// A lexical environment as seen from a particular context.
///
/// Lookups through an `EnvValue` start with its rebindings and metadata,
/// exactly as if the environment had been reached by crossing those
/// boundaries.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct EnvValue {
    pub env: EnvId,
    pub rebindings: Rebindings,
    pub metadata: Metadata,
}

impl EnvValue {
    pub const EMPTY: EnvValue = EnvValue {
        env: EnvId::EMPTY,
        rebindings: Rebindings::NONE,
        metadata: Metadata::EMPTY,
    };

    pub fn plain(env: EnvId) -> Self {
        EnvValue {
            env,
            ..EnvValue::EMPTY
        }
    }
}

/// A shared, immutable equation. Compared by identity.
#[derive(Clone)]
pub struct EquationValue(pub Rc<Equation<Entity>>);

impl PartialEq for EquationValue {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for EquationValue {}

impl Hash for EquationValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        Rc::as_ptr(&self.0).hash(state);
    }
}

impl fmt::Debug for EquationValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.0, f)
    }
}

/// Result of evaluating an expression or property.
#[derive(Clone, Debug, Default, Eq, PartialEq, Hash)]
pub enum Value {
    /// Absent entity.
    #[default]
    Null,
    Unit,
    Bool(bool),
    Int(i64),
    Symbol(Symbol),
    Entity(Entity),
    Env(EnvValue),
    LogicVar(LogicVarId),
    Array(Rc<[Value]>),
    Equation(EquationValue),
}

impl Value {
    pub fn array(values: impl IntoIterator<Item = Value>) -> Self {
        Value::Array(values.into_iter().collect())
    }

    pub fn equation(equation: Equation<Entity>) -> Self {
        Value::Equation(EquationValue(Rc::new(equation)))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Unit => "unit",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Symbol(_) => "symbol",
            Value::Entity(_) => "entity",
            Value::Env(_) => "env",
            Value::LogicVar(_) => "logic var",
            Value::Array(_) => "array",
            Value::Equation(_) => "equation",
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_entity(&self) -> Option<&Entity> {
        match self {
            Value::Entity(e) => Some(e),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(values) => Some(values),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<Entity> for Value {
    fn from(e: Entity) -> Self {
        Value::Entity(e)
    }
}

impl From<Symbol> for Value {
    fn from(s: Symbol) -> Self {
        Value::Symbol(s)
    }
}

/// Static type of a property parameter, return value or dynamic variable.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub enum ValueType {
    Unit,
    Bool,
    Int,
    Symbol,
    /// An entity whose node kind is the given kind or a descendant. Null is
    /// accepted.
    Entity(KindId),
    Env,
    LogicVar,
    Array(Box<ValueType>),
    Equation,
    Any,
}

impl ValueType {
    pub fn array_of(element: ValueType) -> Self {
        ValueType::Array(Box::new(element))
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueType::Unit => write!(f, "unit"),
            ValueType::Bool => write!(f, "bool"),
            ValueType::Int => write!(f, "int"),
            ValueType::Symbol => write!(f, "symbol"),
            ValueType::Entity(kind) => write!(f, "entity<{kind}>"),
            ValueType::Env => write!(f, "env"),
            ValueType::LogicVar => write!(f, "logic var"),
            ValueType::Array(element) => write!(f, "array<{element}>"),
            ValueType::Equation => write!(f, "equation"),
            ValueType::Any => write!(f, "any"),
        }
    }
}
