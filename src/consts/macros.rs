/// For naming a new enum, passing in what type it converts to and
/// from, and providing a mapping from variants to expressions (such
/// as libc consts) that are used when reading and writing netlink
/// messages.
///
/// # Usage
///
/// ```
/// nflogd::impl_var!(
///     /// Attributes of a fake netlink protocol.
///     pub MyNetlinkProtoAttrs, u16,
///     Id => 16u16,
///     Name => 17u16,
///     Size => 18u16
/// );
///
/// assert_eq!(MyNetlinkProtoAttrs::from(17u16), MyNetlinkProtoAttrs::Name);
/// assert!(MyNetlinkProtoAttrs::from(99u16).is_unrecognized());
/// ```
#[macro_export]
macro_rules! impl_var {
    (
        $( #[$outer:meta] )*
        $vis:vis $name:ident, $ty:ty,
        $(
            $( #[doc = $doc:literal] )*
            $var:ident => $val:expr
        ),* $(,)?
    ) => (
        $(#[$outer])*
        #[derive(Copy, Clone, Debug, Eq, Hash, PartialEq)]
        $vis enum $name {
            $(
                $( #[doc = $doc] )*
                #[allow(missing_docs)]
                $var,
            )*
            /// Variant that signifies a value with no known meaning
            UnrecognizedConst($ty),
        }

        impl $name {
            /// Returns true if no variant corresponds to the value
            /// it was created from
            pub fn is_unrecognized(&self) -> bool {
                matches!(*self, $name::UnrecognizedConst(_))
            }
        }

        impl From<$ty> for $name {
            fn from(v: $ty) -> Self {
                match v {
                    $(
                        i if i == $val => $name::$var,
                    )*
                    i => $name::UnrecognizedConst(i)
                }
            }
        }

        impl From<$name> for $ty {
            fn from(v: $name) -> Self {
                match v {
                    $(
                        $name::$var => $val,
                    )*
                    $name::UnrecognizedConst(i) => i,
                }
            }
        }

        impl<'a> From<&'a $name> for $ty {
            fn from(v: &'a $name) -> Self {
                <$ty>::from(*v)
            }
        }
    );
}

/// Attach the short names printed in log lines to variants of an enum
/// created with [`impl_var`].
///
/// Variants that are not listed, including
/// `UnrecognizedConst`, have no mnemonic.
#[macro_export]
macro_rules! impl_mnemonics {
    ($name:ident, $( $var:ident => $label:literal ),* $(,)?) => {
        impl $name {
            /// Short name of this value, if it has one.
            pub fn mnemonic(&self) -> Option<&'static str> {
                match *self {
                    $(
                        $name::$var => Some($label),
                    )*
                    _ => None,
                }
            }
        }
    };
}
