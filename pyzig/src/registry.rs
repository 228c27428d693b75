//! Symbol and registry tables.
//!
//! Populated by the pre-pass over the module and consulted throughout
//! emission: user class metadata (fields, methods, bases), user function
//! signatures, and the variable classification sets that steer codegen.

use crate::types::PyType;
use pyzig_ast::{Arguments, Stmt};
use std::collections::{HashMap, HashSet};

/// One method of a user class.
///
/// The body is retained so that parent methods not overridden in a child
/// can be regenerated with the child's type signature (inheritance is
/// flattened, not virtual).
#[derive(Debug, Clone)]
pub struct MethodInfo {
    pub args: Arguments,
    pub body: Vec<Stmt>,
    pub is_property: bool,
    pub return_type: PyType,
    pub needs_allocator: bool,
    pub returns_error: bool,
}

/// Metadata for one user-declared class.
#[derive(Debug, Clone, Default)]
pub struct ClassInfo {
    pub name: String,
    pub base: Option<String>,
    /// Ordered field table, `__init__` assignment order.
    pub fields: Vec<(String, PyType)>,
    pub methods: HashMap<String, MethodInfo>,
    /// `__init__` parameters after `self`, in declaration order.
    pub init_params: Vec<String>,
}

impl ClassInfo {
    pub fn field_type(&self, name: &str) -> Option<&PyType> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, t)| t)
    }

    pub fn set_field(&mut self, name: &str, ty: PyType) {
        if let Some(slot) = self.fields.iter_mut().find(|(n, _)| n == name) {
            slot.1 = slot.1.widen(&ty);
        } else {
            self.fields.push((name.to_string(), ty));
        }
    }
}

/// Registry of user classes, with base-chain resolution.
#[derive(Debug, Default)]
pub struct ClassRegistry {
    classes: HashMap<String, ClassInfo>,
}

impl ClassRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, info: ClassInfo) {
        self.classes.insert(info.name.clone(), info);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.classes.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&ClassInfo> {
        self.classes.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut ClassInfo> {
        self.classes.get_mut(name)
    }

    /// Resolve a method up the base chain.
    pub fn find_method(&self, class: &str, method: &str) -> Option<&MethodInfo> {
        let mut current = self.classes.get(class);
        while let Some(info) = current {
            if let Some(m) = info.methods.get(method) {
                return Some(m);
            }
            current = info.base.as_deref().and_then(|b| self.classes.get(b));
        }
        None
    }

    pub fn has_method(&self, class: &str, method: &str) -> bool {
        self.find_method(class, method).is_some()
    }

    /// Resolve a field type up the base chain.
    pub fn get_field(&self, class: &str, field: &str) -> Option<&PyType> {
        let mut current = self.classes.get(class);
        while let Some(info) = current {
            if let Some(t) = info.field_type(field) {
                return Some(t);
            }
            current = info.base.as_deref().and_then(|b| self.classes.get(b));
        }
        None
    }

    pub fn names(&self) -> impl Iterator<Item = &String> {
        self.classes.keys()
    }
}

/// Signature of a user function (or `Class.method`).
#[derive(Debug, Clone)]
pub struct FunctionSig {
    pub name: String,
    pub total_params: usize,
    /// `total_params - required_params` trailing parameters carry defaults.
    pub required_params: usize,
    pub param_names: Vec<String>,
    pub param_types: Vec<PyType>,
    pub return_type: PyType,
    pub needs_allocator: bool,
    pub returns_error: bool,
    pub is_async: bool,
    pub is_vararg: bool,
    pub is_kwarg: bool,
}

impl FunctionSig {
    pub fn new(name: &str, param_names: Vec<String>, required_params: usize) -> Self {
        let total_params = param_names.len();
        Self {
            name: name.to_string(),
            total_params,
            required_params,
            // Bottom: call-site seeding widens concrete facts in.
            param_types: vec![PyType::Bottom; total_params],
            param_names,
            return_type: PyType::Bottom,
            needs_allocator: false,
            returns_error: false,
            is_async: false,
            is_vararg: false,
            is_kwarg: false,
        }
    }
}

/// Table of user function signatures, keyed by name or `Class.method`.
#[derive(Debug, Default)]
pub struct SignatureTable {
    sigs: HashMap<String, FunctionSig>,
}

impl SignatureTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, sig: FunctionSig) {
        self.sigs.insert(sig.name.clone(), sig);
    }

    pub fn get(&self, name: &str) -> Option<&FunctionSig> {
        self.sigs.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut FunctionSig> {
        self.sigs.get_mut(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.sigs.contains_key(name)
    }

    /// Whether a call to `name` must thread an allocator.
    pub fn needs_allocator(&self, name: &str) -> bool {
        self.sigs.get(name).is_some_and(|s| s.needs_allocator)
    }

    /// Whether a call to `name` is fallible in the emitted code.
    pub fn returns_error(&self, name: &str) -> bool {
        self.sigs.get(name).is_some_and(|s| s.returns_error)
    }

    pub fn names(&self) -> impl Iterator<Item = &String> {
        self.sigs.keys()
    }
}

/// Variable classification sets for the scope currently being emitted.
///
/// Reset on every function entry; the module scope owns its own instance.
#[derive(Debug, Default, Clone)]
pub struct VarClasses {
    /// Growable lists mutated after declaration.
    pub arraylist_vars: HashSet<String>,
    /// Fixed slices (vararg parameters and the like).
    pub array_slice_vars: HashSet<String>,
    /// Names bound to a capturing struct.
    pub closure_vars: HashSet<String>,
    /// Names bound to a plain hoisted lambda.
    pub lambda_vars: HashSet<String>,
    /// Return type recorded for each lambda/closure binding.
    pub lambda_returns: HashMap<String, PyType>,
    /// Lambda binding to its hoisted function name.
    pub lambda_targets: HashMap<String, String>,
    /// `call` return type of each synthesized capturing struct.
    pub closure_call_returns: HashMap<String, PyType>,
}

/// Program-wide facts collected by the pre-pass.
#[derive(Debug, Default)]
pub struct ProgramFacts {
    pub async_functions: HashSet<String>,
    pub vararg_functions: HashSet<String>,
    pub kwarg_functions: HashSet<String>,
    /// Import alias to module name (`np` -> `numpy`).
    pub imported_modules: HashMap<String, String>,
    /// `from m import f` binding to `(module, function)`.
    pub from_imports: HashMap<String, (String, String)>,
    /// From-imported functions that take a trailing allocator.
    pub from_import_alloc: HashSet<String>,
    /// Classes declared inside a function body; their lambdas cannot hoist.
    pub nested_class_names: HashSet<String>,
}

impl ProgramFacts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve an identifier through the import tables to a module name.
    pub fn module_of(&self, alias: &str) -> Option<&str> {
        self.imported_modules.get(alias).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn method(ret: PyType) -> MethodInfo {
        MethodInfo {
            args: Arguments::default(),
            body: Vec::new(),
            is_property: false,
            return_type: ret,
            needs_allocator: false,
            returns_error: false,
        }
    }

    #[test]
    fn test_find_method_walks_base_chain() {
        let mut registry = ClassRegistry::new();
        let mut animal = ClassInfo {
            name: "Animal".to_string(),
            ..Default::default()
        };
        animal.methods.insert("speak".to_string(), method(PyType::static_str()));
        registry.register(animal);

        let dog = ClassInfo {
            name: "Dog".to_string(),
            base: Some("Animal".to_string()),
            ..Default::default()
        };
        registry.register(dog);

        assert!(registry.has_method("Dog", "speak"));
        assert!(registry.has_method("Animal", "speak"));
        assert!(!registry.has_method("Dog", "fetch"));
        assert_eq!(
            registry.find_method("Dog", "speak").unwrap().return_type,
            PyType::static_str()
        );
    }

    #[test]
    fn test_get_field_walks_base_chain() {
        let mut registry = ClassRegistry::new();
        let mut base = ClassInfo {
            name: "Base".to_string(),
            ..Default::default()
        };
        base.set_field("n", PyType::Int);
        registry.register(base);
        registry.register(ClassInfo {
            name: "Child".to_string(),
            base: Some("Base".to_string()),
            ..Default::default()
        });

        assert_eq!(registry.get_field("Child", "n"), Some(&PyType::Int));
        assert_eq!(registry.get_field("Child", "m"), None);
    }

    #[test]
    fn test_set_field_widens_existing() {
        let mut info = ClassInfo {
            name: "C".to_string(),
            ..Default::default()
        };
        info.set_field("x", PyType::Int);
        info.set_field("x", PyType::Float);
        assert_eq!(info.field_type("x"), Some(&PyType::Float));
        assert_eq!(info.fields.len(), 1);
    }

    #[test]
    fn test_signature_defaults_arithmetic() {
        let sig = FunctionSig::new("f", vec!["a".to_string(), "b".to_string(), "c".to_string()], 1);
        assert_eq!(sig.total_params, 3);
        assert_eq!(sig.required_params, 1);
        assert_eq!(sig.total_params - sig.required_params, 2);
    }

    #[test]
    fn test_signature_table_flags() {
        let mut table = SignatureTable::new();
        let mut sig = FunctionSig::new("g", vec!["x".to_string()], 1);
        sig.needs_allocator = true;
        table.insert(sig);

        assert!(table.needs_allocator("g"));
        assert!(!table.returns_error("g"));
        assert!(!table.needs_allocator("missing"));
    }
}
