use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::{Rc, Weak};
use thiserror::Error;

pub type InstanceRef = Rc<RefCell<ClassInstance>>;

/// Runtime value. Reassigning a slot drops the previous payload, so a shared
/// instance reference is released as soon as the slot holds something else.
#[derive(Clone, Debug, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Shared(InstanceRef),
    /// Observer of a shared instance; never keeps it alive.
    Weak(Weak<RefCell<ClassInstance>>),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("expected {expected}, found {found}")]
pub struct ValueError {
    pub expected: &'static str,
    pub found: &'static str,
}

impl Value {
    pub fn shared(instance: ClassInstance) -> Self {
        Value::Shared(Rc::new(RefCell::new(instance)))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Shared(_) => "instance",
            Value::Weak(_) => "weak instance",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Result<bool, ValueError> {
        match self {
            Value::Bool(value) => Ok(*value),
            other => Err(other.mismatch("bool")),
        }
    }

    pub fn as_int(&self) -> Result<i64, ValueError> {
        match self {
            Value::Int(value) => Ok(*value),
            other => Err(other.mismatch("int")),
        }
    }

    pub fn as_float(&self) -> Result<f64, ValueError> {
        match self {
            Value::Float(value) => Ok(*value),
            other => Err(other.mismatch("float")),
        }
    }

    pub fn as_str(&self) -> Result<&str, ValueError> {
        match self {
            Value::String(value) => Ok(value),
            other => Err(other.mismatch("string")),
        }
    }

    /// Widens `Int` to `f64`; accepts `Float` unchanged.
    pub fn as_number(&self) -> Result<f64, ValueError> {
        match self {
            Value::Int(value) => Ok(*value as f64),
            Value::Float(value) => Ok(*value),
            other => Err(other.mismatch("number")),
        }
    }

    pub fn is_number(&self) -> bool {
        matches!(self, Value::Int(_) | Value::Float(_))
    }

    /// Moves the payload out, leaving `Null` behind.
    pub fn take(&mut self) -> Value {
        std::mem::take(self)
    }

    /// Non-owning observer of the instance held by `self`.
    pub fn downgrade(&self) -> Result<Value, ValueError> {
        match self {
            Value::Shared(instance) => Ok(Value::Weak(Rc::downgrade(instance))),
            Value::Weak(weak) => Ok(Value::Weak(weak.clone())),
            other => Err(other.mismatch("instance")),
        }
    }

    /// Resolves a weak observer to a shared reference, or `Null` once the
    /// instance is gone. Other values are returned as copies.
    pub fn upgrade(&self) -> Value {
        match self {
            Value::Weak(weak) => weak.upgrade().map(Value::Shared).unwrap_or(Value::Null),
            other => other.clone(),
        }
    }

    /// A dead observer reads as `Null`; every other value passes through.
    pub fn live(self) -> Value {
        match self {
            Value::Weak(weak) if weak.strong_count() == 0 => Value::Null,
            other => other,
        }
    }

    fn mismatch(&self, expected: &'static str) -> ValueError {
        ValueError {
            expected,
            found: self.type_name(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "<null>"),
            Value::Bool(v) => write!(f, "{v}"),
            Value::Int(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::String(v) => write!(f, "{v}"),
            Value::Shared(instance) => write!(f, "{}", instance.borrow()),
            Value::Weak(weak) => match weak.upgrade() {
                Some(instance) => write!(f, "{}", instance.borrow()),
                None => write!(f, "<null>"),
            },
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

#[derive(Clone, Debug)]
pub struct ClassInstance {
    pub class_name: String,
    pub fields: BTreeMap<String, Value>,
}

impl ClassInstance {
    pub fn new(class_name: impl Into<String>) -> Self {
        Self {
            class_name: class_name.into(),
            fields: BTreeMap::new(),
        }
    }

    pub fn get_field(&self, field: &str) -> Option<Value> {
        self.fields.get(field).cloned()
    }

    pub fn set_field(&mut self, field: impl Into<String>, value: Value) {
        self.fields.insert(field.into(), value);
    }
}

impl fmt::Display for ClassInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{} instance>", self.class_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_canonical_text() {
        assert_eq!(Value::Null.to_string(), "<null>");
        assert_eq!(Value::Bool(true).to_string(), "true");
        assert_eq!(Value::Bool(false).to_string(), "false");
        assert_eq!(Value::Int(-42).to_string(), "-42");
        assert_eq!(Value::Float(2.5).to_string(), "2.5");
        assert_eq!(Value::from("raw text").to_string(), "raw text");
        assert_eq!(
            Value::shared(ClassInstance::new("Point")).to_string(),
            "<Point instance>"
        );
    }

    #[test]
    fn typed_accessors_reject_other_variants() {
        assert_eq!(Value::Bool(true).as_bool(), Ok(true));
        assert_eq!(Value::Int(7).as_int(), Ok(7));
        assert_eq!(Value::from("s").as_str(), Ok("s"));
        assert_eq!(
            Value::Int(1).as_bool(),
            Err(ValueError {
                expected: "bool",
                found: "int"
            })
        );
        assert!(Value::Float(1.0).as_int().is_err());
        assert!(Value::Int(1).as_float().is_err());
        assert!(Value::Null.as_str().is_err());
    }

    #[test]
    fn numeric_widening_accepts_both_numbers() {
        assert_eq!(Value::Int(3).as_number(), Ok(3.0));
        assert_eq!(Value::Float(0.5).as_number(), Ok(0.5));
        assert!(Value::from("3").as_number().is_err());
        assert!(Value::Bool(true).as_number().is_err());
    }

    #[test]
    fn take_moves_payload_and_leaves_null() {
        let mut slot = Value::from("payload");
        let moved = slot.take();
        assert!(slot.is_null());
        assert_eq!(moved.as_str(), Ok("payload"));

        let mut shared = Value::shared(ClassInstance::new("A"));
        let Value::Shared(rc) = shared.clone() else {
            unreachable!()
        };
        assert_eq!(Rc::strong_count(&rc), 2);
        let moved = shared.take();
        assert!(shared.is_null());
        assert_eq!(Rc::strong_count(&rc), 2);
        drop(moved);
        assert_eq!(Rc::strong_count(&rc), 1);
    }

    #[test]
    fn copying_shares_the_instance() {
        let original = Value::shared(ClassInstance::new("Counter"));
        let copy = original.clone();
        if let Value::Shared(instance) = &copy {
            instance.borrow_mut().set_field("n", Value::Int(5));
        }
        let Value::Shared(instance) = &original else {
            unreachable!()
        };
        assert_eq!(Rc::strong_count(instance), 2);
        assert_eq!(
            instance.borrow().get_field("n").map(|v| v.to_string()),
            Some("5".to_string())
        );
    }

    #[test]
    fn weak_observer_does_not_extend_lifetime() {
        let mut owner = Value::shared(ClassInstance::new("Node"));
        let observer = owner.downgrade().expect("downgrade");
        assert!(matches!(observer.upgrade(), Value::Shared(_)));
        assert!(matches!(observer.clone().live(), Value::Weak(_)));
        assert_eq!(observer.to_string(), "<Node instance>");

        owner = Value::Int(0);
        assert_eq!(owner.as_int(), Ok(0));
        assert!(observer.upgrade().is_null());
        assert_eq!(observer.to_string(), "<null>");
        assert!(observer.live().is_null());
    }

    #[test]
    fn downgrade_requires_an_instance() {
        assert!(Value::Int(1).downgrade().is_err());
    }
}
