use crate::Error;
use indexmap::IndexMap;
use std::fmt;
use std::sync::Arc;

/// Declaration of one remote operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operation {
    name: String,
    params: Vec<&'static str>,
    returns: &'static str,
}

impl Operation {
    pub fn new(name: impl Into<String>, params: Vec<&'static str>, returns: &'static str) -> Self {
        Operation {
            name: name.into(),
            params,
            returns,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Parameter type names in declaration order.
    pub fn params(&self) -> &[&'static str] {
        &self.params
    }

    pub fn arity(&self) -> usize {
        self.params.len()
    }

    pub fn returns(&self) -> &'static str {
        self.returns
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({}) -> {}", self.name, self.params.join(", "), self.returns)
    }
}

/// A named, immutable set of operations.
///
/// Cloning is cheap; clients and servers built from the same descriptor share
/// one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interface {
    inner: Arc<InterfaceInner>,
}

#[derive(Debug, PartialEq, Eq)]
struct InterfaceInner {
    name: String,
    operations: IndexMap<String, Operation>,
}

impl Interface {
    pub fn builder(name: impl Into<String>) -> InterfaceBuilder {
        InterfaceBuilder {
            name: name.into(),
            operations: IndexMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn operation(&self, name: &str) -> Option<&Operation> {
        self.inner.operations.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.inner.operations.contains_key(name)
    }

    /// Operations in declaration order.
    pub fn operations(&self) -> impl Iterator<Item = &Operation> {
        self.inner.operations.values()
    }

    pub fn len(&self) -> usize {
        self.inner.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.operations.is_empty()
    }
}

#[derive(Debug)]
pub struct InterfaceBuilder {
    name: String,
    operations: IndexMap<String, Operation>,
}

impl InterfaceBuilder {
    pub fn operation(mut self, op: Operation) -> Result<Self, Error> {
        if self.operations.contains_key(op.name()) {
            return Err(Error::Registration(format!(
                "interface `{}` declares `{}` twice",
                self.name,
                op.name()
            )));
        }
        self.operations.insert(op.name().to_string(), op);
        Ok(self)
    }

    pub fn build(self) -> Interface {
        Interface {
            inner: Arc::new(InterfaceInner {
                name: self.name,
                operations: self.operations,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn calculator() -> Interface {
        Interface::builder("Calculator")
            .operation(Operation::new("call_none", vec![], "i64"))
            .unwrap()
            .operation(Operation::new("add", vec!["i64", "i64"], "i64"))
            .unwrap()
            .build()
    }

    #[test]
    fn test_lookup_and_order() {
        let iface = calculator();
        assert_eq!(iface.name(), "Calculator");
        assert_eq!(iface.len(), 2);
        assert_eq!(iface.operation("add").unwrap().arity(), 2);
        let names: Vec<_> = iface.operations().map(|op| op.name()).collect();
        assert_eq!(names, vec!["call_none", "add"]);
        assert!(!iface.contains("multiply"));
    }

    #[test]
    fn test_duplicate_operation_rejected() {
        let result = Interface::builder("Calculator")
            .operation(Operation::new("add", vec!["i64", "i64"], "i64"))
            .unwrap()
            .operation(Operation::new("add", vec!["f64", "f64"], "f64"));
        assert!(matches!(result, Err(Error::Registration(_))));
    }

    #[test]
    fn test_operation_display() {
        let op = Operation::new("add", vec!["i64", "i64"], "i64");
        assert_eq!(op.to_string(), "add(i64, i64) -> i64");
    }
}
