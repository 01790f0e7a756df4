//! Per-unit dispatch site tables.
//!
//! A compiled unit owns one table, created once from the descriptors of its
//! call locations. Compiled code calls into the table by site index; the
//! site's kind must match the call.

use crate::context::RuntimeContext;
use crate::kind::{CallKind, SiteDescriptor, SiteFlags};
use crate::site::DispatchSite;
use smallvec::SmallVec;
use std::fmt;
use std::sync::Arc;
use switchyard_core::{RuntimeError, Value};

/// Every dispatch site of one compiled unit.
pub struct DispatchSiteTable {
    unit: Arc<str>,
    context: Arc<RuntimeContext>,
    sites: Box<[DispatchSite]>,
}

impl DispatchSiteTable {
    /// Create the table for `unit` with one site per descriptor.
    pub fn create(
        context: Arc<RuntimeContext>,
        unit: &str,
        descriptors: impl IntoIterator<Item = SiteDescriptor>,
    ) -> Self {
        let unit: Arc<str> = Arc::from(unit);
        let sites: Box<[DispatchSite]> = descriptors
            .into_iter()
            .enumerate()
            .map(|(index, descriptor)| {
                DispatchSite::new(Arc::clone(&unit), index, descriptor, context.config())
            })
            .collect();
        tracing::debug!(unit = %unit, sites = sites.len(), "created dispatch site table");
        Self {
            unit,
            context,
            sites,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.sites.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.sites.is_empty()
    }

    #[inline]
    pub fn site(&self, index: usize) -> Option<&DispatchSite> {
        self.sites.get(index)
    }

    pub fn sites(&self) -> impl Iterator<Item = &DispatchSite> {
        self.sites.iter()
    }

    pub fn unit(&self) -> &str {
        &self.unit
    }

    pub fn context(&self) -> &Arc<RuntimeContext> {
        &self.context
    }

    /// Site `index`, checked against the kind compiled code expects.
    #[inline]
    fn site_for(&self, index: usize, kind: CallKind) -> Result<&DispatchSite, RuntimeError> {
        let site = self.sites.get(index).ok_or_else(|| {
            RuntimeError::internal(format!(
                "site index {index} out of range for unit {} with {} sites",
                self.unit,
                self.sites.len()
            ))
        })?;
        if site.kind() != kind {
            return Err(RuntimeError::internal(format!(
                "site {index} of unit {} is a {} site, called as {}",
                self.unit,
                site.kind(),
                kind
            )));
        }
        Ok(site)
    }

    // =========================================================================
    // Calls
    // =========================================================================

    /// Dispatch through site `index`.
    #[inline]
    pub fn call(
        &self,
        index: usize,
        kind: CallKind,
        receiver: &Value,
        args: &[Value],
    ) -> Result<Value, RuntimeError> {
        let site = match self.site_for(index, kind) {
            Ok(site) => site,
            Err(error) => {
                tracing::error!(unit = %self.unit, index, %error, "invalid call site reference");
                return Err(error);
            }
        };
        site.dispatch(&self.context, receiver, args)
    }

    #[inline]
    pub fn call0(&self, index: usize, kind: CallKind, receiver: &Value) -> Result<Value, RuntimeError> {
        self.call(index, kind, receiver, &[])
    }

    #[inline]
    pub fn call1(
        &self,
        index: usize,
        kind: CallKind,
        receiver: &Value,
        a0: Value,
    ) -> Result<Value, RuntimeError> {
        self.call(index, kind, receiver, &[a0])
    }

    #[inline]
    pub fn call2(
        &self,
        index: usize,
        kind: CallKind,
        receiver: &Value,
        a0: Value,
        a1: Value,
    ) -> Result<Value, RuntimeError> {
        self.call(index, kind, receiver, &[a0, a1])
    }

    #[inline]
    pub fn call3(
        &self,
        index: usize,
        kind: CallKind,
        receiver: &Value,
        a0: Value,
        a1: Value,
        a2: Value,
    ) -> Result<Value, RuntimeError> {
        self.call(index, kind, receiver, &[a0, a1, a2])
    }

    #[inline]
    pub fn call4(
        &self,
        index: usize,
        kind: CallKind,
        receiver: &Value,
        a0: Value,
        a1: Value,
        a2: Value,
        a3: Value,
    ) -> Result<Value, RuntimeError> {
        self.call(index, kind, receiver, &[a0, a1, a2, a3])
    }

    /// Dispatch through a spread site.
    ///
    /// `args` are the fixed arguments. Each `(position, value)` in `spreads`
    /// expands `value` in front of fixed argument `position`, so `f(a, *xs, b)`
    /// is `args = [a, b]`, `spreads = [(1, xs)]`.
    pub fn call_spread(
        &self,
        index: usize,
        kind: CallKind,
        receiver: &Value,
        args: &[Value],
        spreads: &[(usize, Value)],
    ) -> Result<Value, RuntimeError> {
        let site = self.site_for(index, kind)?;
        if !site.descriptor().flags.contains(SiteFlags::SPREAD) {
            return Err(RuntimeError::internal(format!(
                "site {index} of unit {} is not a spread site",
                self.unit
            )));
        }
        let args = despread(args, spreads)?;
        site.dispatch(&self.context, receiver, &args)
    }
}

/// Splice spread values into the fixed arguments.
///
/// A null spread contributes one null argument. Lists and arrays contribute
/// their elements. Anything else is a language-level error.
pub fn despread(args: &[Value], spreads: &[(usize, Value)]) -> Result<SmallVec<[Value; 4]>, RuntimeError> {
    let mut out: SmallVec<[Value; 4]> = SmallVec::with_capacity(args.len() + spreads.len());
    let mut next = 0;
    for (position, value) in spreads {
        let position = *position;
        if position < next || position > args.len() {
            return Err(RuntimeError::internal(format!(
                "spread position {position} out of order for {} fixed arguments",
                args.len()
            )));
        }
        out.extend(args[next..position].iter().cloned());
        next = position;

        match value {
            Value::Null => out.push(Value::Null),
            Value::List(_) | Value::Array(_) => {
                out.extend(value.as_elements().into_iter().flatten().cloned());
            }
            other => {
                return Err(RuntimeError::raised(
                    "IllegalArgumentException",
                    format!("cannot spread the type {} with value {}", other.class_id(), other),
                ));
            }
        }
    }
    out.extend(args[next..].iter().cloned());
    Ok(out)
}

impl fmt::Debug for DispatchSiteTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchSiteTable")
            .field("unit", &self.unit)
            .field("sites", &self.sites)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DispatchConfig;
    use crate::resolver::tests::FlatLookup;

    fn table() -> DispatchSiteTable {
        let ctx = RuntimeContext::with_config(Arc::new(FlatLookup), DispatchConfig::eager()).unwrap();
        DispatchSiteTable::create(
            ctx,
            "Script1",
            [
                SiteDescriptor::method("size"),
                SiteDescriptor::property("name"),
                SiteDescriptor::method("f").spread(),
            ],
        )
    }

    #[test]
    fn test_create() {
        let table = table();
        assert_eq!(table.len(), 3);
        assert!(!table.is_empty());
        assert_eq!(table.unit(), "Script1");
        assert_eq!(table.site(1).map(DispatchSite::kind), Some(CallKind::GetProperty));
        assert_eq!(table.site(2).map(DispatchSite::index), Some(2));
        assert!(table.site(3).is_none());
    }

    #[test]
    fn test_bad_index_and_kind_are_internal() {
        let table = table();
        assert!(table.call0(9, CallKind::Method, &Value::Null).unwrap_err().is_fatal());
        assert!(table.call0(0, CallKind::GetProperty, &Value::Null).unwrap_err().is_fatal());
    }

    #[test]
    fn test_spread_requires_spread_site() {
        let table = table();
        let err = table
            .call_spread(0, CallKind::Method, &Value::Null, &[], &[(0, Value::list([]))])
            .unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_despread_positions() {
        let args = [Value::Int(1), Value::Int(4)];
        let spreads = [(1, Value::list([Value::Int(2), Value::Int(3)]))];
        assert_eq!(
            despread(&args, &spreads).unwrap().as_slice(),
            &[Value::Int(1), Value::Int(2), Value::Int(3), Value::Int(4)]
        );

        let spreads = [(0, Value::list([Value::Int(0)])), (2, Value::list([]))];
        assert_eq!(
            despread(&args, &spreads).unwrap().as_slice(),
            &[Value::Int(0), Value::Int(1), Value::Int(4)]
        );
    }

    #[test]
    fn test_despread_null_is_one_argument() {
        let out = despread(&[], &[(0, Value::Null)]).unwrap();
        assert_eq!(out.as_slice(), &[Value::Null]);
    }

    #[test]
    fn test_despread_rejects_scalars() {
        let err = despread(&[], &[(0, Value::Int(1))]).unwrap_err();
        assert!(matches!(
            &err,
            RuntimeError::Raised { class, message }
                if &**class == "IllegalArgumentException" && message.contains("cannot spread")
        ));
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_despread_bad_position_is_internal() {
        let args = [Value::Int(1)];
        assert!(despread(&args, &[(2, Value::Null)]).unwrap_err().is_fatal());
        assert!(despread(&args, &[(1, Value::Null), (0, Value::Null)]).unwrap_err().is_fatal());
    }
}
