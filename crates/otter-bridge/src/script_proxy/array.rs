//! Array proxies: host arrays used as script sequences.

use std::cmp::Ordering;

use otter_host::Value;
use otter_script::{BinaryOp, CompareOp, Obj, Payload, ScriptError, ScriptResult};

use super::{ScriptProxy, ScriptShape};
use crate::report::HostResultExt;
use crate::state::BridgeState;

/// Longest array the host accepts.
const MAX_ARRAY_LENGTH: usize = u32::MAX as usize;

/// Length of `len` elements repeated `count` times, bounded by the host's
/// array length limit. Negative counts repeat nothing.
fn repeated_length(len: usize, count: isize) -> ScriptResult<usize> {
    let count = usize::try_from(count).unwrap_or(0);
    match len.checked_mul(count) {
        Some(total) if total <= MAX_ARRAY_LENGTH => Ok(total),
        _ => Err(ScriptError::MemoryError),
    }
}

impl ScriptProxy {
    pub(super) fn array_len(&self, state: &BridgeState) -> ScriptResult<usize> {
        state
            .cx
            .array_length(self.object()?)
            .ok_or_else(|| ScriptError::type_error("host array has no length"))
    }

    /// Normalize an integer index against the current length.
    fn checked_index(&self, state: &BridgeState, key: &Obj, message: &str) -> ScriptResult<Option<u32>> {
        let index = match state.interp.index_value(key) {
            Ok(Some(i)) => i,
            Ok(None) => return Ok(None),
            Err(_) => return Err(ScriptError::overflow_error("index too big")),
        };
        let len = self.array_len(state)? as isize;
        let normalized = if index < 0 { index + len } else { index };
        if normalized < 0 || normalized >= len {
            return Err(ScriptError::index_error(message));
        }
        u32::try_from(normalized)
            .map(Some)
            .map_err(|_| ScriptError::overflow_error("index too big"))
    }

    fn indices_error(&self, state: &BridgeState, key: &Obj) -> ScriptError {
        ScriptError::type_error(format!(
            "Array indices must be integers or slices, not {}",
            state.interp.type_name(key)
        ))
    }

    pub(super) fn array_getitem(&self, state: &BridgeState, key: &Obj) -> ScriptResult<Obj> {
        let o = self.object()?;
        if let Some(i) = self.checked_index(state, key, "index out of range")? {
            let value = state.cx.get(o, i).into_script(state)?;
            return state.to_script(&value);
        }
        if !matches!(key.payload(), Payload::Slice(..)) {
            return Err(self.indices_error(state, key));
        }
        let bounds = state.interp.slice_indices(key, self.array_len(state)?)?;
        if bounds.step == 1 {
            let stop = bounds.stop.max(bounds.start);
            let args = [Value::number(bounds.start as f64), Value::number(stop as f64)];
            let slice = state.cx.call_method(&Value::Object(o), "slice", &args).into_script(state)?;
            return state.to_script(&slice);
        }
        let mut picked = Vec::new();
        for i in bounds.indices() {
            picked.push(state.cx.get(o, i as u32).into_script(state)?);
        }
        state.to_script(&Value::Object(state.cx.new_array(picked)))
    }

    pub(super) fn array_setitem(&self, state: &BridgeState, key: &Obj, value: &Obj) -> ScriptResult<()> {
        let o = self.object()?;
        if let Some(i) = self.checked_index(state, key, "assignment index out of range")? {
            let value = state.to_host(value)?;
            return state.cx.set(o, i, value).into_script(state);
        }
        if !matches!(key.payload(), Payload::Slice(..)) {
            return Err(self.indices_error(state, key));
        }
        let items = state.interp.iterate(value)?;
        let bounds = state.interp.slice_indices(key, self.array_len(state)?)?;
        if bounds.step == 1 {
            let stop = bounds.stop.max(bounds.start);
            let mut args = vec![
                Value::number(bounds.start as f64),
                Value::number((stop - bounds.start) as f64),
            ];
            args.extend(state.host_args(&items)?);
            state.cx.call_method(&Value::Object(o), "splice", &args).into_script(state)?;
            return Ok(());
        }
        let indices = bounds.indices();
        if indices.len() != items.len() {
            return Err(ScriptError::value_error(format!(
                "attempt to assign sequence of size {} to extended slice of size {}",
                items.len(),
                indices.len()
            )));
        }
        for (i, item) in indices.into_iter().zip(items.iter()) {
            let item = state.to_host(item)?;
            state.cx.set(o, i as u32, item).into_script(state)?;
        }
        Ok(())
    }

    pub(super) fn array_delitem(&self, state: &BridgeState, key: &Obj) -> ScriptResult<()> {
        let target = self.host_value()?;
        let splice = |start: usize, count: usize| {
            let args = [Value::number(start as f64), Value::number(count as f64)];
            state.cx.call_method(&target, "splice", &args).into_script(state).map(drop)
        };
        if let Some(i) = self.checked_index(state, key, "assignment index out of range")? {
            return splice(i as usize, 1);
        }
        if !matches!(key.payload(), Payload::Slice(..)) {
            return Err(self.indices_error(state, key));
        }
        let bounds = state.interp.slice_indices(key, self.array_len(state)?)?;
        if bounds.step == 1 {
            let stop = bounds.stop.max(bounds.start);
            return splice(bounds.start as usize, (stop - bounds.start) as usize);
        }
        let mut indices = bounds.indices();
        indices.sort_unstable();
        for i in indices.into_iter().rev() {
            splice(i, 1)?;
        }
        Ok(())
    }

    pub(super) fn array_contains(&self, state: &BridgeState, item: &Obj) -> ScriptResult<bool> {
        let item = state.to_host(item)?;
        let found = state
            .cx
            .call_method(&self.host_value()?, "includes", &[item])
            .into_script(state)?;
        found
            .as_bool()
            .ok_or_else(|| ScriptError::type_error("includes() returned a non-boolean value"))
    }

    /// Host array holding the items of a list, tuple or array proxy.
    fn concat_operand(&self, state: &BridgeState, other: &Obj) -> ScriptResult<Option<Value>> {
        if let Some(proxy) = other.native_data::<ScriptProxy>() {
            if proxy.shape == ScriptShape::Array {
                return proxy.host_value().map(Some);
            }
            return Ok(None);
        }
        match other.payload() {
            Payload::List(_) | Payload::Tuple(_) => {
                let items = state.interp.iterate(other)?;
                state.host_array(&items).map(Some)
            }
            _ => Ok(None),
        }
    }

    fn repeated(&self, state: &BridgeState, count: &Obj) -> ScriptResult<Option<Vec<Value>>> {
        let Some(count) = state.interp.index_value(count)? else {
            return Ok(None);
        };
        let items = state.cx.array_elements(self.object()?).into_script(state)?;
        let total = repeated_length(items.len(), count)?;
        Ok(Some(items.iter().cloned().cycle().take(total).collect()))
    }

    pub(super) fn array_binary(
        &self,
        state: &BridgeState,
        op: BinaryOp,
        other: &Obj,
        reflected: bool,
    ) -> ScriptResult<Obj> {
        match op {
            BinaryOp::Add => {
                let Some(operand) = self.concat_operand(state, other)? else {
                    return Ok(state.interp.not_implemented());
                };
                let this = self.host_value()?;
                let (head, tail) = if reflected { (operand, this) } else { (this, operand) };
                let joined = state.cx.call_method(&head, "concat", &[tail]).into_script(state)?;
                state.to_script(&joined)
            }
            BinaryOp::Mul => match self.repeated(state, other)? {
                Some(items) => state.to_script(&Value::Object(state.cx.new_array(items))),
                None => Ok(state.interp.not_implemented()),
            },
            _ => Ok(state.interp.not_implemented()),
        }
    }

    pub(super) fn array_inplace(
        &self,
        state: &BridgeState,
        this: &Obj,
        op: BinaryOp,
        other: &Obj,
    ) -> ScriptResult<Obj> {
        let target = self.host_value()?;
        match op {
            BinaryOp::Add => {
                let items = state.interp.iterate(other)?;
                let args = state.host_args(&items)?;
                state.cx.call_method(&target, "push", &args).into_script(state)?;
                Ok(this.clone())
            }
            BinaryOp::Mul => {
                let Some(count) = state.interp.index_value(other)? else {
                    return Ok(state.interp.not_implemented());
                };
                let o = self.object()?;
                if count <= 0 {
                    state.cx.set(o, "length", Value::Int32(0)).into_script(state)?;
                    return Ok(this.clone());
                }
                let items = state.cx.array_elements(o).into_script(state)?;
                let total = repeated_length(items.len(), count)?;
                if total > items.len() {
                    let extra: Vec<Value> = items.iter().cloned().cycle().take(total - items.len()).collect();
                    state.cx.call_method(&target, "push", &extra).into_script(state)?;
                }
                Ok(this.clone())
            }
            _ => Ok(state.interp.not_implemented()),
        }
    }

    /// Lexicographic comparison against lists, tuples and array proxies.
    pub(super) fn array_compare(&self, state: &BridgeState, other: &Obj, op: CompareOp) -> ScriptResult<Obj> {
        let interp = &*state.interp;
        let theirs = match other.native_data::<ScriptProxy>() {
            Some(proxy) if proxy.shape == ScriptShape::Array => {
                let values = state.cx.array_elements(proxy.object()?).into_script(state)?;
                values.iter().map(|v| state.to_script(v)).collect::<ScriptResult<Vec<_>>>()?
            }
            Some(_) => return Ok(interp.not_implemented()),
            None => match other.payload() {
                Payload::List(_) | Payload::Tuple(_) => interp.iterate(other)?,
                _ => return Ok(interp.not_implemented()),
            },
        };
        let values = state.cx.array_elements(self.object()?).into_script(state)?;
        if values.len() != theirs.len() && matches!(op, CompareOp::Eq | CompareOp::Ne) {
            return Ok(interp.bool(op == CompareOp::Ne));
        }
        let ours = values.iter().map(|v| state.to_script(v)).collect::<ScriptResult<Vec<_>>>()?;
        for (a, b) in ours.iter().zip(theirs.iter()) {
            if !interp.eq(a, b)? {
                return match op {
                    CompareOp::Eq => Ok(interp.bool(false)),
                    CompareOp::Ne => Ok(interp.bool(true)),
                    _ => interp.richcompare(a, b, op),
                };
            }
        }
        Ok(interp.bool(op.test(ours.len().cmp(&theirs.len()))))
    }
}

#[cfg(test)]
mod tests {
    use otter_host::{Context, Value};
    use otter_script::{BinaryOp, CompareOp, Interp};

    use crate::{Bridge, BridgeConfig};

    fn setup() -> (Bridge, otter_script::Obj) {
        let bridge = Bridge::initialize(Context::new(), Interp::new(), BridgeConfig::default()).unwrap();
        let values = vec![Value::Int32(1), Value::Int32(2), Value::Int32(3)];
        let array = Value::Object(bridge.context().new_array(values));
        let proxy = bridge.to_script(&array).unwrap();
        (bridge, proxy)
    }

    #[test]
    fn test_negative_index_and_bounds() {
        let (bridge, proxy) = setup();
        let interp = bridge.interp();
        assert_eq!(interp.getitem(&proxy, &interp.int(-1)).unwrap().as_int(), Some(3));
        let err = interp.getitem(&proxy, &interp.int(3)).unwrap_err();
        assert_eq!(err.to_string(), "IndexError: index out of range");
        let err = interp.setitem(&proxy, &interp.int(5), interp.int(0)).unwrap_err();
        assert_eq!(err.to_string(), "IndexError: assignment index out of range");
        let err = interp.getitem(&proxy, &interp.str("x")).unwrap_err();
        assert!(err.to_string().contains("Array indices must be integers or slices, not str"));
    }

    #[test]
    fn test_slices() {
        let (bridge, proxy) = setup();
        let interp = bridge.interp();
        let slice = interp.slice(interp.int(1), interp.none(), interp.none());
        let tail = interp.getitem(&proxy, &slice).unwrap();
        assert_eq!(interp.len(&tail).unwrap(), 2);

        let reversed = interp.slice(interp.none(), interp.none(), interp.int(-1));
        let back = interp.getitem(&proxy, &reversed).unwrap();
        assert_eq!(interp.getitem(&back, &interp.int(0)).unwrap().as_int(), Some(3));

        let head = interp.slice(interp.int(0), interp.int(1), interp.none());
        interp
            .setitem(&proxy, &head, interp.list(vec![interp.int(7), interp.int(8)]))
            .unwrap();
        assert_eq!(interp.len(&proxy).unwrap(), 4);
        interp.delitem(&proxy, &head).unwrap();
        assert_eq!(interp.getitem(&proxy, &interp.int(0)).unwrap().as_int(), Some(8));
    }

    #[test]
    fn test_delete_splices() {
        let (bridge, proxy) = setup();
        let interp = bridge.interp();
        interp.delitem(&proxy, &interp.int(0)).unwrap();
        assert_eq!(interp.len(&proxy).unwrap(), 2);
        assert_eq!(interp.getitem(&proxy, &interp.int(0)).unwrap().as_int(), Some(2));
    }

    #[test]
    fn test_concat_and_repeat() {
        let (bridge, proxy) = setup();
        let interp = bridge.interp();
        let joined = interp
            .binary_op(&proxy, &interp.list(vec![interp.int(4)]), BinaryOp::Add)
            .unwrap();
        assert_eq!(interp.len(&joined).unwrap(), 4);
        assert_eq!(interp.len(&proxy).unwrap(), 3);

        let twice = interp.binary_op(&proxy, &interp.int(2), BinaryOp::Mul).unwrap();
        assert_eq!(interp.len(&twice).unwrap(), 6);

        interp.inplace_op(&proxy, &interp.int(0), BinaryOp::Mul).unwrap();
        assert_eq!(interp.len(&proxy).unwrap(), 0);
    }

    #[test]
    fn test_repeat_beyond_array_limit() {
        let (bridge, proxy) = setup();
        let interp = bridge.interp();
        let huge = interp.int(1 << 40);
        let err = interp.binary_op(&proxy, &huge, BinaryOp::Mul).unwrap_err();
        assert_eq!(err.to_string(), "MemoryError");
        let err = interp.inplace_op(&proxy, &huge, BinaryOp::Mul).unwrap_err();
        assert_eq!(err.to_string(), "MemoryError");
        assert_eq!(interp.len(&proxy).unwrap(), 3);

        interp.inplace_op(&proxy, &interp.int(3), BinaryOp::Mul).unwrap();
        assert_eq!(interp.len(&proxy).unwrap(), 9);
        assert_eq!(interp.getitem(&proxy, &interp.int(8)).unwrap().as_int(), Some(3));

        // An empty array repeats to nothing without walking the count
        let empty = bridge.to_script(&Value::Object(bridge.context().new_array(vec![]))).unwrap();
        interp.inplace_op(&empty, &interp.int(i64::MAX), BinaryOp::Mul).unwrap();
        assert_eq!(interp.len(&empty).unwrap(), 0);
    }

    #[test]
    fn test_contains_and_compare() {
        let (bridge, proxy) = setup();
        let interp = bridge.interp();
        assert!(interp.contains(&proxy, &interp.int(2)).unwrap());
        assert!(!interp.contains(&proxy, &interp.int(9)).unwrap());

        let same = interp.list(vec![interp.int(1), interp.int(2), interp.int(3)]);
        assert!(interp.compare(&proxy, &same, CompareOp::Eq).unwrap());
        let shorter = interp.list(vec![interp.int(1), interp.int(2)]);
        assert!(interp.compare(&proxy, &shorter, CompareOp::Ne).unwrap());
        assert!(interp.compare(&proxy, &shorter, CompareOp::Gt).unwrap());
        let bigger = interp.list(vec![interp.int(1), interp.int(5)]);
        assert!(interp.compare(&proxy, &bigger, CompareOp::Lt).unwrap());
    }
}
