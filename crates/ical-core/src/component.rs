//! Generic iCalendar component tree (RFC 5545 §3.4-3.6).
//!
//! Every calendar object is a [`Component`]: an uppercase name, an ordered list
//! of [`Property`] values and an ordered list of nested components. Names are
//! normalized to ASCII uppercase on construction so lookups are
//! case-insensitive.
//!
//! A component can be locked to freeze a finalized snapshot. Every mutator on
//! a locked component returns [`TreeError::Locked`] and leaves it untouched.

use crate::error::{Result, TreeError};

/// A property parameter such as `TZID=Europe/Berlin` or `MEMBER="a","b"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parameter {
    /// Parameter name (uppercase).
    pub name: String,
    /// Parameter values in order of appearance, unquoted.
    pub values: Vec<String>,
}

impl Parameter {
    /// Creates a single-valued parameter.
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into().to_ascii_uppercase(),
            values: vec![value.into()],
        }
    }

    /// Creates a parameter with several values.
    pub fn multi(name: impl Into<String>, values: Vec<String>) -> Self {
        Self {
            name: name.into().to_ascii_uppercase(),
            values,
        }
    }

    /// Returns the first value.
    pub fn value(&self) -> Option<&str> {
        self.values.first().map(String::as_str)
    }
}

/// A single property (content line) of a component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Property {
    /// Property name (uppercase).
    pub name: String,
    /// Parameters in order of appearance.
    pub params: Vec<Parameter>,
    /// Raw value text, exactly as it appeared after unfolding.
    pub value: String,
}

impl Property {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into().to_ascii_uppercase(),
            params: Vec::new(),
            value: value.into(),
        }
    }

    /// Builder-style variant of [`Property::set_param`].
    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_param(Parameter::new(name, value));
        self
    }

    pub fn param(&self, name: &str) -> Option<&Parameter> {
        self.params
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(name))
    }

    /// Returns the first value of the named parameter.
    pub fn param_value(&self, name: &str) -> Option<&str> {
        self.param(name)?.value()
    }

    /// Sets a parameter, replacing any existing parameter with the same name.
    ///
    /// A replaced parameter keeps its position.
    pub fn set_param(&mut self, param: Parameter) {
        match self.params.iter_mut().find(|p| p.name == param.name) {
            Some(existing) => *existing = param,
            None => self.params.push(param),
        }
    }

    /// Removes the named parameter. Returns whether it was present.
    pub fn remove_param(&mut self, name: &str) -> bool {
        let before = self.params.len();
        self.params.retain(|p| !p.name.eq_ignore_ascii_case(name));
        self.params.len() != before
    }
}

/// An iCalendar component with its properties and sub-components.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Component {
    /// Component name (uppercase), e.g. `VEVENT`.
    pub name: String,
    properties: Vec<Property>,
    components: Vec<Component>,
    locked: bool,
}

impl Component {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into().to_ascii_uppercase(),
            properties: Vec::new(),
            components: Vec::new(),
            locked: false,
        }
    }

    /// Creates an empty `VCALENDAR` carrying the two required properties.
    pub fn calendar(product_id: &str) -> Self {
        let mut root = Self::new("VCALENDAR");
        root.properties.push(Property::new("VERSION", "2.0"));
        root.properties.push(Property::new("PRODID", product_id));
        root
    }

    // -----------------------------------------------------------------------
    // Properties
    // -----------------------------------------------------------------------

    /// Returns the first property with the given name.
    pub fn property(&self, name: &str) -> Option<&Property> {
        self.properties
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(name))
    }

    /// Returns all properties with the given name, in insertion order.
    pub fn properties<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Property> + 'a {
        self.properties
            .iter()
            .filter(move |p| p.name.eq_ignore_ascii_case(name))
    }

    /// Returns every property of this component.
    pub fn all_properties(&self) -> &[Property] {
        &self.properties
    }

    pub fn has_property(&self, name: &str) -> bool {
        self.property(name).is_some()
    }

    pub fn add_property(&mut self, property: Property) -> Result<()> {
        self.ensure_unlocked()?;
        self.properties.push(property);
        Ok(())
    }

    /// Replaces every property named like `property` with `property`.
    ///
    /// The new property takes the position of the first one it replaces, or
    /// is appended when none existed.
    pub fn set_property(&mut self, property: Property) -> Result<()> {
        self.ensure_unlocked()?;
        match self.properties.iter().position(|p| p.name == property.name) {
            Some(first) => {
                self.properties[first] = property;
                let name = self.properties[first].name.clone();
                let mut index = 0;
                self.properties.retain(|p| {
                    let keep = index <= first || p.name != name;
                    index += 1;
                    keep
                });
            }
            None => self.properties.push(property),
        }
        Ok(())
    }

    /// Removes every property with the given name. Returns how many were removed.
    pub fn remove_properties(&mut self, name: &str) -> Result<usize> {
        self.ensure_unlocked()?;
        let before = self.properties.len();
        self.properties.retain(|p| !p.name.eq_ignore_ascii_case(name));
        Ok(before - self.properties.len())
    }

    /// Keeps only the properties for which `keep` returns true.
    pub fn retain_properties<F>(&mut self, keep: F) -> Result<usize>
    where
        F: FnMut(&Property) -> bool,
    {
        self.ensure_unlocked()?;
        let before = self.properties.len();
        self.properties.retain(keep);
        Ok(before - self.properties.len())
    }

    /// Returns the first property with the given name for in-place editing.
    pub fn property_mut(&mut self, name: &str) -> Result<Option<&mut Property>> {
        self.ensure_unlocked()?;
        Ok(self
            .properties
            .iter_mut()
            .find(|p| p.name.eq_ignore_ascii_case(name)))
    }

    /// Applies `edit` to every property with the given name.
    pub fn update_properties<F>(&mut self, name: &str, mut edit: F) -> Result<usize>
    where
        F: FnMut(&mut Property),
    {
        self.ensure_unlocked()?;
        let mut touched = 0;
        for property in self
            .properties
            .iter_mut()
            .filter(|p| p.name.eq_ignore_ascii_case(name))
        {
            edit(property);
            touched += 1;
        }
        Ok(touched)
    }

    /// Replaces the full property list, keeping sub-components.
    pub fn replace_properties(&mut self, properties: Vec<Property>) -> Result<()> {
        self.ensure_unlocked()?;
        self.properties = properties;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Sub-components
    // -----------------------------------------------------------------------

    /// Returns the sub-components with the given name.
    pub fn components<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Component> + 'a {
        self.components
            .iter()
            .filter(move |c| c.name.eq_ignore_ascii_case(name))
    }

    /// Returns every sub-component.
    pub fn all_components(&self) -> &[Component] {
        &self.components
    }

    pub fn add_component(&mut self, component: Component) -> Result<()> {
        self.ensure_unlocked()?;
        self.components.push(component);
        Ok(())
    }

    /// Removes and returns every sub-component for which `matches` returns true.
    pub fn remove_components<F>(&mut self, mut matches: F) -> Result<Vec<Component>>
    where
        F: FnMut(&Component) -> bool,
    {
        self.ensure_unlocked()?;
        let (removed, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.components)
            .into_iter()
            .partition(|c| matches(c));
        self.components = kept;
        Ok(removed)
    }

    // -----------------------------------------------------------------------
    // Locking
    // -----------------------------------------------------------------------

    /// Locks this component and all of its descendants.
    pub fn lock(&mut self) {
        self.locked = true;
        for child in &mut self.components {
            child.lock();
        }
    }

    /// Unlocks this component and all of its descendants.
    pub fn unlock(&mut self) {
        self.locked = false;
        for child in &mut self.components {
            child.unlock();
        }
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    /// Returns an unlocked deep copy of this component.
    pub fn unlocked_clone(&self) -> Self {
        let mut copy = self.clone();
        copy.unlock();
        copy
    }

    fn ensure_unlocked(&self) -> Result<()> {
        if self.locked {
            return Err(TreeError::Locked {
                component: self.name.clone(),
            });
        }
        Ok(())
    }
}
