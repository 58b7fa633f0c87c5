//! Gatehouse demo binary
//!
//! With `SUPABASE_URL` and `SUPABASE_ANON_KEY` set (or in `.env`), resolves
//! the session against the real project. Pass the URL the OAuth flow
//! redirected to as the first argument to complete a sign-in.
//!
//! Without them, runs the same store against in-memory providers and walks
//! through sign-in, onboarding and sign-out.

use gatehouse_session::mocks::{MockIdentityProvider, MockProfileRepository};
use gatehouse_session::providers::supabase::SupabaseClient;
use gatehouse_session::{
    AuthConfig, AuthStore, IdentityId, IdentityProvider, Profile, ProfileRepository, RouteGuard,
    Session, SessionEnvironment, SessionUser, SupabaseConfig,
};
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,gatehouse_session=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AuthConfig::from_env();

    match SupabaseConfig::from_env() {
        Ok(supabase) => run_against_supabase(supabase, config).await,
        Err(error) => {
            tracing::info!(%error, "Supabase not configured, using in-memory providers");
            run_in_memory(config).await
        },
    }
}

async fn run_against_supabase(supabase: SupabaseConfig, config: AuthConfig) -> anyhow::Result<()> {
    println!("=== Gatehouse: Supabase project {} ===\n", supabase.url);

    let client = SupabaseClient::new(supabase);
    let auth = AuthStore::new(SessionEnvironment::new(client.clone(), client.clone(), config));
    auth.initialize().await?;
    print_routes(&auth);

    match std::env::args().nth(1) {
        Some(redirect_url) => {
            let session = client.complete_oauth_redirect(&redirect_url).await?;
            println!("\n>>> Signed in as {}", session.identity());
            settle(&auth).await;
            print_routes(&auth);
        },
        None => {
            let redirect = auth.sign_in_with_google().await?;
            println!("\nTo sign in, open:\n  {}", redirect.url);
            println!("then run again with the URL you were sent back to.");
        },
    }

    auth.shutdown().await?;
    Ok(())
}

async fn run_in_memory(config: AuthConfig) -> anyhow::Result<()> {
    println!("=== Gatehouse: in-memory providers ===\n");

    let identity = MockIdentityProvider::new();
    let profiles = MockProfileRepository::new();
    let auth = AuthStore::new(SessionEnvironment::new(
        identity.clone(),
        profiles.clone(),
        config,
    ));

    auth.initialize().await?;
    print_routes(&auth);

    let id = IdentityId::new();
    let redirect = auth.sign_in_with_google().await?;
    println!("\n>>> OAuth redirect prepared: {}", redirect.url);
    println!(">>> Provider reports sign-in for {id}");
    identity.sign_in_as(Session::new(
        SessionUser::new(id).with_display_name("Ada Lovelace"),
        "demo-token",
    ));
    settle(&auth).await;
    print_routes(&auth);

    println!("\n>>> Onboarding questionnaire submitted");
    profiles.insert(Profile::new(id).onboarded().with_full_name("Ada Lovelace"));
    auth.refresh_profile().await?;
    print_routes(&auth);

    println!("\n>>> Signing out");
    auth.sign_out().await?;
    print_routes(&auth);

    auth.shutdown().await?;
    Ok(())
}

/// Wait for the store to pick up a provider change and finish its lookup.
async fn settle<P, R>(auth: &AuthStore<P, R>)
where
    P: IdentityProvider + Clone + 'static,
    R: ProfileRepository + Clone + 'static,
{
    let mut snapshots = auth.watch();
    let settled = tokio::time::timeout(
        Duration::from_secs(10),
        snapshots.wait_for(|state| state.session.is_some() && !state.is_loading()),
    )
    .await;

    if settled.is_err() {
        tracing::warn!("Gave up waiting for the session to settle");
    }
}

fn print_routes<P, R>(auth: &AuthStore<P, R>)
where
    P: IdentityProvider + Clone + 'static,
    R: ProfileRepository + Clone + 'static,
{
    let snapshot = auth.snapshot();
    let routes = &auth.config().routes;

    println!("phase: {:?}", snapshot.phase());
    if let Some(session) = &snapshot.session {
        println!(
            "  signed in: {} ({})",
            session.identity(),
            session.user.display_name.as_deref().unwrap_or("no name")
        );
    }
    if let Some(error) = snapshot.last_error {
        println!("  last error: {error}");
    }
    for (path, guard) in [
        (routes.home.as_str(), RouteGuard::protected()),
        (routes.onboarding.as_str(), RouteGuard::onboarding()),
        (routes.login.as_str(), RouteGuard::public_only()),
    ] {
        println!("  {path:<28} → {:?}", auth.guard(guard));
    }
}
