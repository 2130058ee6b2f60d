/// Binds a wrapper holding a single `object` field to a structure type.
macro_rules! impl_class {
    ($name:ident, $type_name:literal) => {
        impl<'a, A> kobj_core::Class<'a, A> for $name<'a, A>
        where
            A: kobj_core::AddressSpace,
        {
            const TYPE_NAME: &'static str = $type_name;

            fn from_object(object: kobj_core::Object<'a, A>) -> Self {
                Self { object }
            }

            fn object(&self) -> &kobj_core::Object<'a, A> {
                &self.object
            }
        }

        impl<'a, A> From<$name<'a, A>> for kobj_core::Object<'a, A>
        where
            A: kobj_core::AddressSpace,
        {
            fn from(value: $name<'a, A>) -> Self {
                value.object
            }
        }

        impl<A> Clone for $name<'_, A>
        where
            A: kobj_core::AddressSpace,
        {
            fn clone(&self) -> Self {
                Self {
                    object: self.object.clone(),
                }
            }
        }

        impl<A> std::fmt::Debug for $name<'_, A>
        where
            A: kobj_core::AddressSpace,
        {
            fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                f.debug_tuple(stringify!($name))
                    .field(&self.object.offset())
                    .finish()
            }
        }
    };
}

pub(crate) use impl_class;
