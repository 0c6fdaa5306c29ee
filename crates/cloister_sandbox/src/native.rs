//! Native capability modules.
//!
//! A native module is instantiated inside a sandbox by binding Rust
//! callbacks directly into the context. No source text is interpreted.
//! [`InspectBinding`] provides the engine-level type checks and object
//! introspection that value formatting needs.

use crate::error::{SandboxError, SandboxResult};
use crate::host::throw_type_error;
use crate::reference::Reference;
use crate::sandbox::Sandbox;
use deno_core::v8;

/// A module instantiated from pre-linked native code
pub trait NativeModule {
    /// Module name used in logs and errors
    fn name(&self) -> &str;

    /// Instantiate inside `sandbox`, returning the module's exports object
    ///
    /// # Errors
    ///
    /// Returns error if the module cannot be instantiated.
    fn create<'sb>(&self, sandbox: &'sb Sandbox) -> SandboxResult<Reference<'sb>>;
}

/// Native binding exposing a single `makeBinding` factory
#[derive(Debug, Clone, Copy, Default)]
pub struct InspectBinding;

impl InspectBinding {
    /// Name of the factory export
    pub const FACTORY: &'static str = "makeBinding";

    /// Create the binding
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl NativeModule for InspectBinding {
    fn name(&self) -> &str {
        "inspect_binding"
    }

    fn create<'sb>(&self, sandbox: &'sb Sandbox) -> SandboxResult<Reference<'sb>> {
        let value = sandbox.with_scope(|scope| {
            let exports = v8::Object::new(scope);
            set_method(scope, exports, Self::FACTORY, make_binding).ok_or_else(|| {
                SandboxError::Native {
                    module: self.name().to_string(),
                    reason: format!("could not define {}", Self::FACTORY),
                }
            })?;
            let exports: v8::Local<v8::Value> = exports.into();
            Ok(v8::Global::new(scope, exports))
        })?;
        Ok(sandbox.adopt(value))
    }
}

/// Promise state constants, matching the engine's numbering
pub mod promise_state {
    /// Pending
    pub const PENDING: u32 = 0;
    /// Fulfilled
    pub const FULFILLED: u32 = 1;
    /// Rejected
    pub const REJECTED: u32 = 2;
}

/// Property filter constants accepted by `getOwnNonIndexProperties`
pub mod property_filter {
    /// Every own property, symbols included
    pub const ALL_PROPERTIES: u32 = 0;
    /// Enumerable properties only
    pub const ONLY_ENUMERABLE: u32 = 2;
}

fn set_value<'s>(
    scope: &mut v8::HandleScope<'s>,
    target: v8::Local<'s, v8::Object>,
    name: &str,
    value: v8::Local<'s, v8::Value>,
) -> Option<()> {
    let key = v8::String::new(scope, name)?;
    target.set(scope, key.into(), value)?;
    Some(())
}

fn set_method<'s>(
    scope: &mut v8::HandleScope<'s>,
    target: v8::Local<'s, v8::Object>,
    name: &str,
    callback: impl v8::MapFnTo<v8::FunctionCallback>,
) -> Option<()> {
    let func = v8::Function::new(scope, callback)?;
    set_value(scope, target, name, func.into())
}

fn set_u32<'s>(
    scope: &mut v8::HandleScope<'s>,
    target: v8::Local<'s, v8::Object>,
    name: &str,
    value: u32,
) -> Option<()> {
    let value = v8::Integer::new_from_unsigned(scope, value);
    set_value(scope, target, name, value.into())
}

fn new_child<'s>(
    scope: &mut v8::HandleScope<'s>,
    target: v8::Local<'s, v8::Object>,
    name: &str,
) -> Option<v8::Local<'s, v8::Object>> {
    let child = v8::Object::new(scope);
    set_value(scope, target, name, child.into())?;
    Some(child)
}

macro_rules! type_checks {
    ($($name:literal => $check:ident),* $(,)?) => {
        fn install_type_checks<'s>(
            scope: &mut v8::HandleScope<'s>,
            types: v8::Local<'s, v8::Object>,
        ) -> Option<()> {
            $(
                {
                    fn check(
                        _scope: &mut v8::HandleScope,
                        args: v8::FunctionCallbackArguments,
                        mut rv: v8::ReturnValue,
                    ) {
                        rv.set_bool(args.get(0).$check());
                    }
                    set_method(scope, types, $name, check)?;
                }
            )*
            Some(())
        }
    };
}

type_checks! {
    "isExternal" => is_external,
    "isDate" => is_date,
    "isArgumentsObject" => is_arguments_object,
    "isBigIntObject" => is_big_int_object,
    "isBooleanObject" => is_boolean_object,
    "isNumberObject" => is_number_object,
    "isStringObject" => is_string_object,
    "isSymbolObject" => is_symbol_object,
    "isNativeError" => is_native_error,
    "isRegExp" => is_reg_exp,
    "isAsyncFunction" => is_async_function,
    "isGeneratorFunction" => is_generator_function,
    "isGeneratorObject" => is_generator_object,
    "isPromise" => is_promise,
    "isMap" => is_map,
    "isSet" => is_set,
    "isMapIterator" => is_map_iterator,
    "isSetIterator" => is_set_iterator,
    "isWeakMap" => is_weak_map,
    "isWeakSet" => is_weak_set,
    "isArrayBuffer" => is_array_buffer,
    "isDataView" => is_data_view,
    "isSharedArrayBuffer" => is_shared_array_buffer,
    "isProxy" => is_proxy,
    "isModuleNamespaceObject" => is_module_namespace_object,
}

fn is_any_array_buffer(
    _scope: &mut v8::HandleScope,
    args: v8::FunctionCallbackArguments,
    mut rv: v8::ReturnValue,
) {
    let value = args.get(0);
    rv.set_bool(value.is_array_buffer() || value.is_shared_array_buffer());
}

fn is_boxed_primitive(
    _scope: &mut v8::HandleScope,
    args: v8::FunctionCallbackArguments,
    mut rv: v8::ReturnValue,
) {
    let value = args.get(0);
    rv.set_bool(
        value.is_number_object()
            || value.is_string_object()
            || value.is_boolean_object()
            || value.is_big_int_object()
            || value.is_symbol_object(),
    );
}

fn get_constructor_name(
    scope: &mut v8::HandleScope,
    args: v8::FunctionCallbackArguments,
    mut rv: v8::ReturnValue,
) {
    let Ok(object) = v8::Local::<v8::Object>::try_from(args.get(0)) else {
        throw_type_error(scope, "The \"object\" argument must be an object");
        return;
    };
    rv.set(object.get_constructor_name().into());
}

fn get_own_non_index_properties(
    scope: &mut v8::HandleScope,
    args: v8::FunctionCallbackArguments,
    mut rv: v8::ReturnValue,
) {
    let Ok(object) = v8::Local::<v8::Object>::try_from(args.get(0)) else {
        throw_type_error(scope, "The \"object\" argument must be an object");
        return;
    };
    let filter_value = args.get(1);
    let filter = if filter_value.is_uint32() {
        filter_value.uint32_value(scope)
    } else {
        None
    };
    let property_filter = match filter {
        Some(property_filter::ALL_PROPERTIES) => v8::PropertyFilter::ALL_PROPERTIES,
        Some(property_filter::ONLY_ENUMERABLE) => v8::PropertyFilter::ONLY_ENUMERABLE,
        _ => {
            throw_type_error(scope, "Unsupported property filter");
            return;
        }
    };
    let names = object.get_property_names(
        scope,
        v8::GetPropertyNamesArgs {
            mode: v8::KeyCollectionMode::OwnOnly,
            property_filter,
            index_filter: v8::IndexFilter::SkipIndices,
            key_conversion: v8::KeyConversionMode::KeepNumbers,
        },
    );
    if let Some(names) = names {
        rv.set(names.into());
    }
}

fn get_proxy_details(
    scope: &mut v8::HandleScope,
    args: v8::FunctionCallbackArguments,
    mut rv: v8::ReturnValue,
) {
    let Ok(proxy) = v8::Local::<v8::Proxy>::try_from(args.get(0)) else {
        return;
    };
    let target = proxy.get_target(scope);
    if args.length() == 1 || args.get(1).is_true() {
        let handler = proxy.get_handler(scope);
        let details = v8::Array::new_with_elements(scope, &[target, handler]);
        rv.set(details.into());
    } else {
        rv.set(target);
    }
}

fn preview_entries(
    scope: &mut v8::HandleScope,
    args: v8::FunctionCallbackArguments,
    mut rv: v8::ReturnValue,
) {
    let Ok(object) = v8::Local::<v8::Object>::try_from(args.get(0)) else {
        return;
    };
    let (entries, is_key_value) = object.preview_entries(scope);
    let Some(entries) = entries else {
        return;
    };
    if args.length() == 1 {
        rv.set(entries.into());
        return;
    }
    let is_key_value = v8::Boolean::new(scope, is_key_value);
    let result = v8::Array::new_with_elements(scope, &[entries.into(), is_key_value.into()]);
    rv.set(result.into());
}

fn get_promise_details(
    scope: &mut v8::HandleScope,
    args: v8::FunctionCallbackArguments,
    mut rv: v8::ReturnValue,
) {
    let Ok(promise) = v8::Local::<v8::Promise>::try_from(args.get(0)) else {
        return;
    };
    let state = match promise.state() {
        v8::PromiseState::Pending => promise_state::PENDING,
        v8::PromiseState::Fulfilled => promise_state::FULFILLED,
        v8::PromiseState::Rejected => promise_state::REJECTED,
    };
    let state_value: v8::Local<v8::Value> = v8::Integer::new_from_unsigned(scope, state).into();
    let details = if state == promise_state::PENDING {
        v8::Array::new_with_elements(scope, &[state_value])
    } else {
        let result = promise.result(scope);
        v8::Array::new_with_elements(scope, &[state_value, result])
    };
    rv.set(details.into());
}

fn build_binding<'s>(scope: &mut v8::HandleScope<'s>) -> Option<v8::Local<'s, v8::Object>> {
    let binding = v8::Object::new(scope);

    let buffer = new_child(scope, binding, "buffer")?;
    set_u32(scope, buffer, "kMaxLength", 0)?;

    let config = new_child(scope, binding, "config")?;
    let has_intl = v8::Boolean::new(scope, false);
    set_value(scope, config, "hasIntl", has_intl.into())?;

    let constants = new_child(scope, binding, "constants")?;
    new_child(scope, constants, "os")?;

    let types = new_child(scope, binding, "types")?;
    install_type_checks(scope, types)?;
    set_method(scope, types, "isAnyArrayBuffer", is_any_array_buffer)?;
    set_method(scope, types, "isBoxedPrimitive", is_boxed_primitive)?;

    let util = new_child(scope, binding, "util")?;
    set_method(scope, util, "getProxyDetails", get_proxy_details)?;
    set_method(scope, util, "getConstructorName", get_constructor_name)?;
    set_method(scope, util, "getOwnNonIndexProperties", get_own_non_index_properties)?;
    set_method(scope, util, "previewEntries", preview_entries)?;
    set_method(scope, util, "getPromiseDetails", get_promise_details)?;
    set_u32(scope, util, "kPending", promise_state::PENDING)?;
    set_u32(scope, util, "kFulfilled", promise_state::FULFILLED)?;
    set_u32(scope, util, "kRejected", promise_state::REJECTED)?;
    let filters = new_child(scope, util, "propertyFilter")?;
    set_u32(scope, filters, "ALL_PROPERTIES", property_filter::ALL_PROPERTIES)?;
    set_u32(scope, filters, "ONLY_ENUMERABLE", property_filter::ONLY_ENUMERABLE)?;

    Some(binding)
}

fn make_binding(
    scope: &mut v8::HandleScope,
    _args: v8::FunctionCallbackArguments,
    mut rv: v8::ReturnValue,
) {
    match build_binding(scope) {
        Some(binding) => rv.set(binding.into()),
        None => crate::host::throw_error(scope, "failed to build capability table"),
    }
}
