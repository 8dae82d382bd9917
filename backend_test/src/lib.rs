use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::{format_ident, quote};
use syn::{parse_macro_input, spanned::Spanned, FnArg, Ident, ItemFn, Pat, Signature, Type};

/// Transform an asynchronous test into a synchronous one and inject dependencies.
///
/// Every test gets a fresh in-memory store and a recording notifier behind a
/// local Rocket instance. Injectable dependencies are
/// [`rocket::local::asynchronous::Client`], [`crate::store::MemoryStore`] and
/// [`crate::notify::RecordingNotifier`].
///
/// `#[backend_test(admin)]` signs the client in as the example admin, and
/// `#[backend_test(alumni)]` signs it in as the example approved alumnus.
#[proc_macro_attribute]
pub fn backend_test(args: TokenStream, input: TokenStream) -> TokenStream {
    let mut item_fn = parse_macro_input!(input as ItemFn);

    // Extract the injected arguments and reject invalid function signatures.
    let test_args = match check_sig(item_fn.sig.clone()) {
        Ok(args) => args,
        Err(err) => {
            return err.into_compile_error().into();
        }
    };

    // Rename the future so the test can have its original name.
    let name = item_fn.sig.ident.clone();
    let new_name = format_ident!("{}_fut", name);
    item_fn.sig.ident = new_name.clone();

    // Log in the client as admin/alumnus if needed.
    let maybe_login = match parse_macro_input!(args as Option<Ident>) {
        Some(arg) if arg == "admin" => quote! {
            crate::store::DirectoryStore::insert_admin(
                &store,
                crate::model::db::admin::NewAdmin::example(),
            )
            .await
            .unwrap();

            let response = rocket_client
                .post("/auth/admin")
                .header(rocket::http::ContentType::JSON)
                .body(rocket::serde::json::json!(crate::model::api::admin::AdminCredentials::example1()).to_string())
                .dispatch()
                .await;
            assert_eq!(rocket::http::Status::Ok, response.status());
        },
        Some(arg) if arg == "alumni" => quote! {
            let alumnus = crate::store::DirectoryStore::insert_alumnus(
                &store,
                crate::model::db::alumnus::AlumnusCore::approved_example(),
            )
            .await
            .unwrap();

            let response = rocket_client
                .post("/auth/alumni/otp")
                .header(rocket::http::ContentType::JSON)
                .body(rocket::serde::json::json!(crate::model::api::otp::OtpRequest::example()).to_string())
                .dispatch()
                .await;
            assert_eq!(rocket::http::Status::Ok, response.status());

            let code = notifier.last_code_for(&alumnus.email).unwrap();
            let response = rocket_client
                .post("/auth/alumni/verify")
                .header(rocket::http::ContentType::JSON)
                .body(rocket::serde::json::json!({
                    "student_id": alumnus.student_id,
                    "verification_code": alumnus.verification_code,
                    "code": code,
                }).to_string())
                .dispatch()
                .await;
            assert_eq!(rocket::http::Status::Ok, response.status());
        },
        Some(arg) => {
            return syn::Error::new(arg.span(), "Expected `admin` or `alumni`")
                .into_compile_error()
                .into();
        }
        None => quote! {},
    };

    // Rewrite the test function.
    quote! {
        #[test]
        fn #name() {
            /// Test setup.
            async fn setup() -> (
                rocket::local::asynchronous::Client,
                crate::store::MemoryStore,
                crate::notify::RecordingNotifier,
            ) {
                let store = crate::store::MemoryStore::default();
                let notifier = crate::notify::RecordingNotifier::default();
                let rocket_client = rocket::local::asynchronous::Client::tracked(
                    crate::rocket_for_store_and_notifier(
                        std::sync::Arc::new(store.clone()),
                        std::sync::Arc::new(notifier.clone()),
                    ),
                )
                .await
                .unwrap();

                {
                    #maybe_login
                }

                (rocket_client, store, notifier)
            }

            /// The test itself.
            #item_fn

            let runtime = rocket::tokio::runtime::Builder::new_multi_thread()
                .thread_name("rocket-worker-test-thread")
                .worker_threads(1)
                .enable_all()
                .build()
                .unwrap();

            runtime.block_on(async {
                #[allow(unused_variables)]
                let (rocket_client, store, notifier) = setup().await;
                #new_name(#(#test_args),*).await;
            });
        }
    }
    .into()
}

/// Ensure the wrapped test is async, extract parameters to inject, and reject unknown parameters.
fn check_sig(sig: Signature) -> Result<Vec<TokenStream2>, syn::Error> {
    if sig.asyncness.is_none() {
        return Err(syn::Error::new(sig.span(), "Test must be marked `async`"));
    }

    let mut args = vec![];
    let mut seen: Vec<String> = vec![];

    for input in &sig.inputs {
        if let FnArg::Typed(pat_type) = input {
            if let (Pat::Ident(_), Type::Path(type_path)) = (&*pat_type.pat, &*pat_type.ty) {
                if let Some(segment) = type_path.path.segments.last() {
                    let type_name = segment.ident.to_string();
                    let injected = match type_name.as_str() {
                        "Client" => Some(quote! { rocket_client }),
                        "MemoryStore" => Some(quote! { store.clone() }),
                        "RecordingNotifier" => Some(quote! { notifier.clone() }),
                        _ => None,
                    };
                    if let Some(injected) = injected {
                        if seen.contains(&type_name) {
                            return Err(syn::Error::new(
                                input.span(),
                                format!("Test cannot accept more than one `{type_name}`"),
                            ));
                        }
                        seen.push(type_name);
                        args.push(injected);
                        continue;
                    }
                }
            }
        }

        return Err(syn::Error::new(
            input.span(),
            "Expected one of `client: Client`, `store: MemoryStore` or `notifier: RecordingNotifier`",
        ));
    }

    Ok(args)
}
