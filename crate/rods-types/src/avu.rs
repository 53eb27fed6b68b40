/// Separator between a namespace and the attribute it qualifies.
pub const NAMESPACE_SEPARATOR: char = ':';

/// An attribute/value/units metadata triple.
///
/// AVUs are attached to collections and data objects. Attributes are
/// multi-valued: the same attribute may be attached several times
/// with different values, but an exact (attribute, value, units)
/// duplicate is stored only once.
#[derive(
    Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Deserialize, serde::Serialize,
)]
pub struct Avu {
    attribute: String,
    value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    units: Option<String>,
}

impl Avu {
    pub fn new(attribute: impl Into<String>, value: impl Into<String>) -> Avu {
        Avu {
            attribute: attribute.into(),
            value: value.into(),
            units: None,
        }
    }

    /// Return this AVU with its units set.
    pub fn with_units(mut self, units: impl Into<String>) -> Avu {
        self.units = Some(units.into());
        self
    }

    /// Return this AVU with its attribute qualified by `namespace`.
    ///
    /// A bare attribute "attr" becomes "namespace:attr". An attribute
    /// that already carries a namespace is kept verbatim.
    pub fn with_namespace(self, namespace: &str) -> Avu {
        if self.namespace().is_some() {
            return self;
        }

        Avu {
            attribute: format!("{}{}{}", namespace, NAMESPACE_SEPARATOR, self.attribute),
            value: self.value,
            units: self.units,
        }
    }

    pub fn attribute(&self) -> &str {
        &self.attribute
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn units(&self) -> Option<&str> {
        self.units.as_deref()
    }

    /// The namespace part of the attribute, if any.
    pub fn namespace(&self) -> Option<&str> {
        self.attribute
            .split_once(NAMESPACE_SEPARATOR)
            .map(|(ns, _)| ns)
    }
}

impl std::fmt::Display for Avu {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.units {
            Some(units) => write!(f, "{}={} ({})", self.attribute, self.value, units),
            None => write!(f, "{}={}", self.attribute, self.value),
        }
    }
}

/// Attributes recorded on Oxford Nanopore sequencing runs.
///
/// A fixed schema owned by the metadata collaborator; this crate only
/// uses it to build AVUs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OntAttribute {
    ExperimentName,
    InstrumentSlot,
}

impl OntAttribute {
    /// Namespace qualifying all ONT attributes.
    pub const NAMESPACE: &'static str = "ont";

    pub fn as_str(&self) -> &'static str {
        match self {
            OntAttribute::ExperimentName => "experiment_name",
            OntAttribute::InstrumentSlot => "instrument_slot",
        }
    }
}

impl std::fmt::Display for OntAttribute {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
