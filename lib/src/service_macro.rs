//! `define_service!` — function-pointer service tables.
//!
//! A service is a named struct of plain `fn` pointers plus a registration
//! and accessor pair. The invoking module supplies a `static` fallback table
//! so every entry is callable before the platform layer registers itself.
//!
//! ```ignore
//! cadence_lib::define_service! {
//!     platform: PORTABLE_PLATFORM => PlatformServices {
//!         timer_ticks() -> u64;
//!         @no_wrapper console_puts(s: &[u8]);
//!     }
//! }
//!
//! static PORTABLE_PLATFORM: PlatformServices = PlatformServices {
//!     timer_ticks: || 0,
//!     console_puts: |_| {},
//! };
//! ```
//!
//! Each method gets a free wrapper function of the same name unless marked
//! `@no_wrapper` (used when the module wants to write the wrapper by hand,
//! e.g. for reference arguments or `-> !` returns).

#[macro_export]
macro_rules! define_service {
    (
        $(#[$meta:meta])*
        $name:ident : $fallback:ident => $struct_name:ident {
            $( $(@$no_wrapper:ident)? $method:ident ( $($arg:ident : $aty:ty),* $(,)? ) $(-> $ret:ty)? ; )*
        }
    ) => {
        $crate::paste::paste! {
            $(#[$meta])*
            pub struct $struct_name {
                $( pub $method : fn( $($aty),* ) $(-> $ret)? , )*
            }

            static [<$name:upper _SERVICES>]: $crate::ServiceCell<$struct_name> =
                $crate::ServiceCell::new(&$fallback);

            #[doc = concat!(
                "Install the `", stringify!($name), "` service table. ",
                "The latest registration wins."
            )]
            pub fn [<register_ $name _services>](services: &'static $struct_name) {
                [<$name:upper _SERVICES>].set(services);
            }

            #[doc = concat!("Active `", stringify!($name), "` service table.")]
            #[inline(always)]
            pub fn [<$name _services>]() -> &'static $struct_name {
                [<$name:upper _SERVICES>].get()
            }

            $(
                $crate::define_service!(
                    @wrapper $(@$no_wrapper)?
                    [<$name _services>] ; $method ( $($arg : $aty),* ) $(-> $ret)?
                );
            )*
        }
    };

    (@wrapper @no_wrapper $accessor:ident ; $method:ident ( $($arg:ident : $aty:ty),* ) $(-> $ret:ty)? ) => {};

    (@wrapper $accessor:ident ; $method:ident ( $($arg:ident : $aty:ty),* ) $(-> $ret:ty)? ) => {
        #[inline(always)]
        pub fn $method ( $($arg : $aty),* ) $(-> $ret)? {
            ($accessor().$method)( $($arg),* )
        }
    };
}
