//! Collection Built-ins
//!
//! Mutating methods of the keyed collection types (map set/delete, set
//! add/delete, clear). These operate on raw storage directly, which is why
//! they reject a wrapped receiver: handing them a wrapper would mutate
//! nothing the dependency graph knows how to attribute. The wrapper's
//! `invoke` catches [`ReactiveError::IncompatibleReceiver`] and retries
//! against the raw node, then derives triggers from the returned
//! [`Applied`] report plus the net size change.

use smallvec::{smallvec, SmallVec};

use super::error::ReactiveError;
use super::graph::DepKey;
use super::value::{Key, NodeData, NodeRef, Value};

/// A collection-mutating built-in method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// `map.set(key, value)`
    MapSet,
    /// `map.delete(key)` — returns whether the key existed.
    MapDelete,
    /// `set.add(member)`
    SetAdd,
    /// `set.delete(member)` — returns whether the member existed.
    SetDelete,
    /// `clear()` on a map or set.
    Clear,
}

impl Method {
    pub fn name(self) -> &'static str {
        match self {
            Method::MapSet => "Map::set",
            Method::MapDelete => "Map::delete",
            Method::SetAdd => "Set::add",
            Method::SetDelete => "Set::delete",
            Method::Clear => "clear",
        }
    }
}

/// Result of applying a built-in: the return value plus the entry keys whose
/// observable state changed. Size/iteration changes are derived by the
/// caller from the collection's net size change.
#[derive(Debug)]
pub(crate) struct Applied {
    pub ret: Value,
    pub touched: SmallVec<[DepKey; 2]>,
}

fn key_arg(method: Method, args: &[Value], index: usize) -> Result<Key, ReactiveError> {
    args.get(index)
        .and_then(|v| Key::try_from(&v.to_raw()).ok())
        .ok_or(ReactiveError::BadKey {
            method: method.name(),
        })
}

/// Apply a built-in to a raw receiver.
///
/// Stored values are unwrapped first so a wrapper never leaks into raw
/// storage.
pub(crate) fn apply(
    method: Method,
    receiver: &NodeRef,
    args: &[Value],
) -> Result<Applied, ReactiveError> {
    if receiver.is_wrapper() {
        return Err(ReactiveError::IncompatibleReceiver {
            method: method.name(),
        });
    }
    let kind = receiver.kind();
    let unsupported = || ReactiveError::UnsupportedMethod {
        method: method.name(),
        kind,
    };

    match method {
        Method::MapSet => {
            let key = key_arg(method, args, 0)?;
            let value = args.get(1).cloned().unwrap_or(Value::Null).to_raw();
            receiver.with_data_mut(|data| match data {
                NodeData::Map(entries) => {
                    let changed = match entries.get(&key) {
                        Some(old) => *old != value,
                        None => true,
                    };
                    if changed {
                        entries.insert(key.clone(), value);
                    }
                    Ok(Applied {
                        ret: Value::Null,
                        touched: if changed {
                            smallvec![DepKey::Entry(key)]
                        } else {
                            SmallVec::new()
                        },
                    })
                }
                _ => Err(unsupported()),
            })
        }
        Method::MapDelete => {
            let key = key_arg(method, args, 0)?;
            receiver.with_data_mut(|data| match data {
                NodeData::Map(entries) => {
                    let existed = entries.shift_remove(&key).is_some();
                    Ok(Applied {
                        ret: Value::Bool(existed),
                        touched: if existed {
                            smallvec![DepKey::Entry(key)]
                        } else {
                            SmallVec::new()
                        },
                    })
                }
                _ => Err(unsupported()),
            })
        }
        Method::SetAdd => {
            let key = key_arg(method, args, 0)?;
            receiver.with_data_mut(|data| match data {
                NodeData::Set(members) => {
                    let added = members.insert(key.clone());
                    Ok(Applied {
                        ret: Value::Null,
                        touched: if added {
                            smallvec![DepKey::Entry(key)]
                        } else {
                            SmallVec::new()
                        },
                    })
                }
                _ => Err(unsupported()),
            })
        }
        Method::SetDelete => {
            let key = key_arg(method, args, 0)?;
            receiver.with_data_mut(|data| match data {
                NodeData::Set(members) => {
                    let existed = members.shift_remove(&key);
                    Ok(Applied {
                        ret: Value::Bool(existed),
                        touched: if existed {
                            smallvec![DepKey::Entry(key)]
                        } else {
                            SmallVec::new()
                        },
                    })
                }
                _ => Err(unsupported()),
            })
        }
        Method::Clear => receiver.with_data_mut(|data| match data {
            NodeData::Map(entries) => {
                let touched = entries.keys().cloned().map(DepKey::Entry).collect();
                entries.clear();
                Ok(Applied {
                    ret: Value::Null,
                    touched,
                })
            }
            NodeData::Set(members) => {
                let touched = members.iter().cloned().map(DepKey::Entry).collect();
                members.clear();
                Ok(Applied {
                    ret: Value::Null,
                    touched,
                })
            }
            _ => Err(unsupported()),
        }),
    }
}
