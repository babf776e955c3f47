//! Request handler definitions
//!
//! Define each route and its handler here.
//! Handlers that are generic over the storage backend or payment provider are declared with the `route!` macro, which
//! generates a service factory type named after the handler, e.g. `create_order` becomes `CreateOrderRoute<B>`.
//!
//! Handlers stay thin: they decode the request, call the engine and map the result. Every business decision is made
//! in `ordpay_engine`.
use actix_web::{get, web, HttpRequest, HttpResponse, Responder};
use log::*;
use ordpay_engine::{
    db_types::{IdentifierType, OrderNumber, PaymentReference, RateLimitKey, RateLimitOperation},
    order_objects::CreateOrderRequest,
    provider::{PaymentProvider, PAYSTACK_SIGNATURE_HEADER},
    reconciliation_objects::WebhookAck,
    OrderFlowApi,
    PaymentGatewayDatabase,
    ReconciliationApi,
};

use crate::{
    config::ServerOptions,
    data_objects::{JsonResponse, OrderResponse, OrderView, VerificationResponse},
    errors::ServerError,
    helpers::get_remote_ip,
};

pub const IDEMPOTENCY_KEY_HEADER: &str = "Idempotency-Key";

// Web-actix cannot handle generics in handlers, so it's implemented manually using the `route!` macro
#[macro_export]
macro_rules! route {
    ($name:ident => $method:ident $path:literal impl $($bounds:ty),+) => {
        paste::paste! { pub struct [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ >( $( core::marker::PhantomData<fn() -> [< T $bounds:camel> ] >,)+ );}
        paste::paste! { impl< $( [< T $bounds:camel> ],)+ > [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ > {
            #[allow(clippy::new_without_default)]
            pub fn new() -> Self {
                Self($( core::marker::PhantomData::<fn() -> [< T $bounds:camel> ] >,)+)
            }
        }}
        paste::paste! { impl<$( [< T $bounds:camel >] , )+> actix_web::dev::HttpServiceFactory for [<$name:camel Route>]<$([<T $bounds:camel>],)+>
        where
            $([<T $bounds:camel>]: $bounds + 'static,)+
        {
            fn register(self, config: &mut actix_web::dev::AppService) {
                let res = actix_web::Resource::new($path)
                    .name(stringify!($name))
                    .guard(actix_web::guard::$method())
                    .to($name::< $( [< T $bounds:camel >], )+>);
                actix_web::dev::HttpServiceFactory::register(res, config);
            }
        }}
    };
}

#[get("/health")]
pub async fn health() -> impl Responder {
    trace!("💻️ Received health check request");
    HttpResponse::Ok().body("👍️\n")
}

//----------------------------------------------   Orders  ----------------------------------------------------
route!(create_order => Post "/orders" impl PaymentGatewayDatabase);
/// Route handler for checkout.
///
/// The body is a [`CreateOrderRequest`]. Clients must send an `Idempotency-Key` header and reuse it when they retry
/// the same submission. The first request answers `201 Created`; a replay of it answers `200 OK` with the same order.
pub async fn create_order<B: PaymentGatewayDatabase>(
    req: HttpRequest,
    body: web::Bytes,
    api: web::Data<OrderFlowApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let key = req
        .headers()
        .get(IDEMPOTENCY_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .ok_or(ServerError::MissingIdempotencyKey)?;
    let request = serde_json::from_slice::<CreateOrderRequest>(&body).map_err(|e| {
        debug!("💻️ Could not decode checkout request. {e}");
        ServerError::InvalidRequestBody(e.to_string())
    })?;
    debug!("💻️ POST create_order for {} ({} lines)", request.customer, request.items.len());
    let created = api.create_order(request, key).await?;
    let is_replay = created.is_replay;
    let response = OrderResponse::from(created);
    if is_replay {
        Ok(HttpResponse::Ok().json(response))
    } else {
        Ok(HttpResponse::Created().json(response))
    }
}

route!(order_by_number => Get "/orders/{order_number}" impl PaymentGatewayDatabase);
pub async fn order_by_number<B: PaymentGatewayDatabase>(
    path: web::Path<String>,
    api: web::Data<OrderFlowApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let order_number = OrderNumber::from(path.into_inner());
    trace!("💻️ GET order {order_number}");
    let order = api
        .fetch_order(&order_number)
        .await?
        .ok_or_else(|| ServerError::NoRecordFound(format!("Order {order_number} does not exist")))?;
    let items = api.fetch_order_items(order.id).await?;
    Ok(HttpResponse::Ok().json(OrderView::new(&order, &items)))
}

//----------------------------------------------   Payments  ----------------------------------------------------
route!(verify_payment => Post "/payments/verify/{reference}" impl PaymentGatewayDatabase, PaymentProvider);
/// Route handler for payment verification.
///
/// The storefront calls this when the customer returns from the payment page. The provider is asked directly, so this
/// works even when the webhook is late. Callers are rate limited by IP address.
pub async fn verify_payment<B, P>(
    req: HttpRequest,
    path: web::Path<String>,
    options: web::Data<ServerOptions>,
    api: web::Data<ReconciliationApi<B, P>>,
) -> Result<HttpResponse, ServerError>
where
    B: PaymentGatewayDatabase,
    P: PaymentProvider,
{
    let reference = PaymentReference::from(path.into_inner());
    let peer = get_remote_ip(&req, options.use_x_forwarded_for, options.use_forwarded)
        .map(|ip| ip.to_string())
        .unwrap_or_else(|| {
            warn!("💻️ Could not determine the remote IP address for a verification request");
            "unknown".to_string()
        });
    debug!("💻️ POST verify_payment for {reference} from {peer}");
    let requester = RateLimitKey::new(peer, IdentifierType::Ip, RateLimitOperation::VerifyPayment);
    let result = api.verify_payment_for(&requester, &reference).await?;
    Ok(HttpResponse::Ok().json(VerificationResponse::from(result)))
}

//----------------------------------------------   Webhooks  ----------------------------------------------------
route!(payment_webhook => Post "/payments" impl PaymentGatewayDatabase, PaymentProvider);
/// Route handler for payment provider webhooks.
///
/// The raw body is handed over untouched, since the signature is computed over the exact bytes. Every delivery is
/// acknowledged with the same `200` response, whether it was applied, a duplicate or ignored. Only a failure that
/// left nothing committed answers `500`, so that the provider delivers the event again.
pub async fn payment_webhook<B, P>(
    req: HttpRequest,
    body: web::Bytes,
    api: web::Data<ReconciliationApi<B, P>>,
) -> HttpResponse
where
    B: PaymentGatewayDatabase,
    P: PaymentProvider,
{
    let signature = req.headers().get(PAYSTACK_SIGNATURE_HEADER).and_then(|v| v.to_str().ok());
    trace!("💻️ Received a {}-byte payment webhook", body.len());
    match api.handle_webhook(&body, signature).await {
        Ok(ack) => {
            match &ack {
                WebhookAck::Ignored => debug!("💻️ Payment webhook ignored"),
                WebhookAck::Duplicate => debug!("💻️ Duplicate payment webhook acknowledged"),
                WebhookAck::Processed(outcome) => debug!("💻️ Payment webhook processed: {}", outcome.as_str()),
            }
            HttpResponse::Ok().json(JsonResponse::success("Webhook received."))
        },
        Err(e) if e.is_retryable() => {
            warn!("💻️ Payment webhook could not be processed and will be redelivered. {e}");
            HttpResponse::InternalServerError().json(JsonResponse::failure("Webhook could not be processed."))
        },
        Err(e) => {
            error!("💻️ Payment webhook could not be processed. {e}");
            HttpResponse::Ok().json(JsonResponse::success("Webhook received."))
        },
    }
}
